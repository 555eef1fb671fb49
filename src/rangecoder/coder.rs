use crate::buffer_io::{BufferReader, BufferWriter};
use crate::constants::{
    RC_EOF, RC_MAX_RANGE, RC_MIN_RANGE, RC_NORM_MASK, RC_NORM_SHIFT, RC_NUM_SYMBOLS,
};
use crate::error::{Error, Result};

/// Frequency table plus its cumulative-distribution derivative.
///
/// `cumulative[s]` is the number of symbol occurrences strictly before
/// `s`; `cumulative[RC_NUM_SYMBOLS]` equals `total`.
struct FreqTable {
    total: u32,
    frequencies: [u32; RC_NUM_SYMBOLS],
    cumulative: [u32; RC_NUM_SYMBOLS + 1],
}

impl FreqTable {
    fn new() -> Self {
        FreqTable {
            total: 0,
            frequencies: [0; RC_NUM_SYMBOLS],
            cumulative: [0; RC_NUM_SYMBOLS + 1],
        }
    }

    fn from_input(data: &[u8]) -> Self {
        let mut table = FreqTable::new();
        for &byte in data {
            table.frequencies[byte as usize] += 1;
        }
        table.frequencies[RC_EOF as usize] = 1;
        table.calculate_cdf();
        table
    }

    fn from_bytes(bytes: &[u8]) -> Self {
        let mut table = FreqTable::new();
        for (i, freq) in table.frequencies.iter_mut().enumerate() {
            *freq = u32::from_le_bytes(bytes[i * 4..i * 4 + 4].try_into().unwrap());
        }
        table.calculate_cdf();
        table
    }

    fn calculate_cdf(&mut self) {
        self.cumulative[0] = 0;
        for i in 1..=RC_NUM_SYMBOLS {
            self.cumulative[i] = self.cumulative[i - 1] + self.frequencies[i - 1];
        }
        self.total = self.cumulative[RC_NUM_SYMBOLS];
    }

    fn write_to(&self, out: &mut BufferWriter) -> Result<()> {
        for &freq in &self.frequencies {
            out.write_u32(freq)?;
        }
        Ok(())
    }
}

struct Encoder {
    low: u64,
    range: u64,
}

impl Encoder {
    fn new() -> Self {
        Encoder {
            low: 0,
            range: RC_MAX_RANGE,
        }
    }

    fn encode(&mut self, table: &FreqTable, out: &mut BufferWriter, symbol: u32) -> Result<()> {
        let sym_low = table.cumulative[symbol as usize] as u64;
        let sym_high = table.cumulative[symbol as usize + 1] as u64;
        let sym_freq = sym_high - sym_low;
        let total = table.total as u64;

        self.low += (sym_low * self.range) / total;
        self.range = (self.range * sym_freq) / total;

        while self.range < RC_MIN_RANGE {
            let top_digit = (self.low >> RC_NORM_SHIFT) as u8;
            out.put(top_digit)?;

            if (self.low & RC_NORM_MASK) + self.range <= RC_NORM_MASK {
                self.low = (self.low << 8) & RC_MAX_RANGE;
                self.range = (self.range << 8) & RC_MAX_RANGE;
            } else {
                self.low = (self.low << 8) & RC_MAX_RANGE;
                self.range = RC_MAX_RANGE - self.low;
            }
        }

        Ok(())
    }

    fn finish(&mut self, out: &mut BufferWriter) -> Result<()> {
        while (self.low & RC_NORM_MASK) + self.range <= RC_NORM_MASK {
            let top_digit = (self.low >> RC_NORM_SHIFT) as u8;
            out.put(top_digit)?;

            self.low = (self.low << 8) & RC_MAX_RANGE;
            self.range = (self.range << 8) & RC_MAX_RANGE;
        }

        let mut code = self.low + self.range / 2;
        while code > 0 {
            let top_digit = (code >> RC_NORM_SHIFT) as u8;
            out.put(top_digit)?;
            code = (code << 8) & RC_MAX_RANGE;
        }

        Ok(())
    }
}

struct Decoder<'a> {
    low: u64,
    range: u64,
    code: u64,
    input: &'a [u8],
    bytes_read: usize,
}

impl<'a> Decoder<'a> {
    fn start(input: &'a [u8]) -> Self {
        let mut dec = Decoder {
            low: 0,
            range: RC_MAX_RANGE,
            code: 0,
            input,
            bytes_read: 0,
        };

        for _ in 0..5 {
            let digit = dec.read_digit();
            dec.code = (dec.code << 8) | digit as u64;
        }

        dec
    }

    fn read_digit(&mut self) -> u8 {
        if self.bytes_read >= self.input.len() {
            return 0;
        }

        let digit = self.input[self.bytes_read];
        self.bytes_read += 1;
        digit
    }

    fn decode(&mut self, table: &FreqTable) -> u32 {
        let offset = self.code - self.low;
        let value = ((offset + 1) * table.total as u64 - 1) / self.range;

        let mut start = 0u32;
        let mut end = RC_NUM_SYMBOLS as u32;
        while end - start > 1 {
            let middle = (start + end) >> 1;
            if table.cumulative[middle as usize] as u64 > value {
                end = middle;
            } else {
                start = middle;
            }
        }

        let symbol = start;

        let sym_low = table.cumulative[symbol as usize] as u64;
        let sym_high = table.cumulative[symbol as usize + 1] as u64;
        let sym_freq = sym_high - sym_low;
        let total = table.total as u64;

        self.low += (sym_low * self.range) / total;
        self.range = (self.range * sym_freq) / total;

        while self.range < RC_MIN_RANGE {
            if (self.low & RC_NORM_MASK) + self.range <= RC_NORM_MASK {
                self.low = (self.low << 8) & RC_MAX_RANGE;
                self.range = (self.range << 8) & RC_MAX_RANGE;
            } else {
                self.low = (self.low << 8) & RC_MAX_RANGE;
                self.range = RC_MAX_RANGE - self.low;
            }

            let digit = self.read_digit();
            self.code = ((self.code << 8) | digit as u64) & RC_MAX_RANGE;
        }

        symbol
    }
}

/// Range-encodes `data`, appending the frequency table and the coded
/// bitstream to `out`.
///
/// `data` must be no longer than [`crate::constants::RC_MAX_SYMBOLS`]
/// bytes; larger inputs must be chunked by the caller (bricks and frame
/// payloads are always well under this bound in practice).
pub fn encode(data: &[u8], out: &mut BufferWriter) -> Result<()> {
    if data.len() as u64 > crate::constants::RC_MAX_SYMBOLS {
        return Err(Error::InvalidInput(
            "data is too large to encode, must have size less than RC_MAX_SYMBOLS".into(),
        ));
    }

    let table = FreqTable::from_input(data);
    table.write_to(out)?;

    let mut enc = Encoder::new();
    let start_write_idx = out.len();
    out.write_u64(0)?;

    for &byte in data {
        enc.encode(&table, out, byte as u32)?;
    }
    enc.encode(&table, out, RC_EOF)?;
    enc.finish(out)?;

    let cur_pos = out.len();
    let size = cur_pos - start_write_idx - 8;
    out.patch_u64(start_write_idx, size)?;

    Ok(())
}

/// Decodes a range-coded buffer produced by [`encode`] back to its
/// original bytes.
pub fn decode(data: &[u8]) -> Result<Vec<u8>> {
    if data.len() < RC_NUM_SYMBOLS * 4 {
        return Err(Error::InvalidInput(
            "in buffer not large enough to hold frequency data".into(),
        ));
    }

    let table = FreqTable::from_bytes(&data[..RC_NUM_SYMBOLS * 4]);
    let rest = &data[RC_NUM_SYMBOLS * 4..];

    if table.total as u64 > crate::constants::RC_MAX_SYMBOLS {
        return Err(Error::InvalidInput(
            "data is too large to decode, must have size less than RC_MAX_SYMBOLS".into(),
        ));
    }

    let mut reader = BufferReader::new(rest);
    let total_bytes = reader.read_u64()? as usize;
    let coded = reader.read(total_bytes as u64)?;

    let mut dec = Decoder::start(coded);
    let mut output = Vec::new();

    loop {
        let symbol = dec.decode(&table);
        if symbol == RC_EOF {
            break;
        }
        output.push(symbol as u8);
    }

    Ok(output)
}
