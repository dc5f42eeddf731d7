use crate::dictionary::Dictionary;
use crate::rng::FuzzRng;
use rand::seq::SliceRandom;

/// Bytes that tend to be syntactically meaningful in text formats.
const BIASED_BYTES: &[u8] = b"!*'();:@&=+$,/?%#[]012Az-`~.\xff\x00";

/// Largest run inserted by `InsertRepeatedBytes`.
const MAX_REPEATED_BYTES: usize = 128;
const MIN_REPEATED_BYTES: usize = 3;

/// Largest window permuted by `ShuffleBytes`.
const MAX_SHUFFLE_WINDOW: usize = 8;

/// Offsets below this may have a binary integer replaced by the input length.
const LENGTH_FIELD_WINDOW: usize = 64;

/// One byte-level transformation from the fixed catalog.
///
/// Every mutation either returns a new buffer no longer than `max_len`, or `None` when it does
/// not apply to this input and bound.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mutation {
    EraseBytes,
    InsertByte,
    InsertRepeatedBytes,
    ChangeByte,
    ChangeBit,
    ShuffleBytes,
    ChangeAsciiInt,
    ChangeBinInt,
    CopyPart,
    CrossOver,
    DictionaryWord,
}

impl Mutation {
    pub const ALL: [Mutation; 11] = [
        Mutation::EraseBytes,
        Mutation::InsertByte,
        Mutation::InsertRepeatedBytes,
        Mutation::ChangeByte,
        Mutation::ChangeBit,
        Mutation::ShuffleBytes,
        Mutation::ChangeAsciiInt,
        Mutation::ChangeBinInt,
        Mutation::CopyPart,
        Mutation::CrossOver,
        Mutation::DictionaryWord,
    ];

    pub fn apply(
        self,
        rng: &mut FuzzRng,
        dictionary: &Dictionary,
        data: &[u8],
        max_len: usize,
        crossover: Option<&[u8]>,
    ) -> Option<Vec<u8>> {
        match self {
            Mutation::EraseBytes => erase_bytes(rng, data, max_len),
            Mutation::InsertByte => insert_byte(rng, data, max_len),
            Mutation::InsertRepeatedBytes => insert_repeated_bytes(rng, data, max_len),
            Mutation::ChangeByte => change_byte(rng, data, max_len),
            Mutation::ChangeBit => change_bit(rng, data, max_len),
            Mutation::ShuffleBytes => shuffle_bytes(rng, data, max_len),
            Mutation::ChangeAsciiInt => change_ascii_int(rng, data, max_len),
            Mutation::ChangeBinInt => change_bin_int(rng, data, max_len),
            Mutation::CopyPart => copy_part(rng, data, max_len),
            Mutation::CrossOver => cross_over(rng, data, max_len, crossover?),
            Mutation::DictionaryWord => dictionary_word(rng, dictionary, data, max_len),
        }
    }
}

/// Applies randomly chosen mutations from the catalog until one applies.
#[derive(Debug, Clone, Default)]
pub struct Mutator {
    dictionary: Dictionary,
}

impl Mutator {
    pub fn new(dictionary: Dictionary) -> Self {
        Self { dictionary }
    }

    pub fn dictionary(&self) -> &Dictionary {
        &self.dictionary
    }

    /// Returns a mutated copy of `data` that is at most `max_len` bytes long.
    ///
    /// Terminates for any `max_len >= 1`: an empty input always accepts `InsertByte`, an input
    /// within bounds always accepts `ChangeByte`, and an oversized input always accepts
    /// `EraseBytes`. A zero bound yields an empty buffer.
    pub fn mutate(
        &self,
        rng: &mut FuzzRng,
        data: &[u8],
        max_len: usize,
        crossover: Option<&[u8]>,
    ) -> Vec<u8> {
        if max_len == 0 {
            return Vec::new();
        }
        loop {
            let mutation = Mutation::ALL[rng.random_int(Mutation::ALL.len())];
            if let Some(out) = mutation.apply(rng, &self.dictionary, data, max_len, crossover) {
                debug_assert!(out.len() <= max_len, "{mutation:?} exceeded max_len");
                return out;
            }
        }
    }
}

fn biased_byte(rng: &mut FuzzRng) -> u8 {
    if rng.random_bool() {
        return rng.random_byte();
    }
    BIASED_BYTES[rng.random_pos(BIASED_BYTES.len())]
}

fn splice(data: &[u8], pos: usize, remove: usize, insert: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(data.len() - remove + insert.len());
    out.extend_from_slice(&data[..pos]);
    out.extend_from_slice(insert);
    out.extend_from_slice(&data[pos + remove..]);
    out
}

fn erase_bytes(rng: &mut FuzzRng, data: &[u8], max_len: usize) -> Option<Vec<u8>> {
    let len = data.len();
    if len <= 1 {
        return None;
    }
    // Oversized inputs must come back within bounds.
    let min_erase = len.saturating_sub(max_len);
    let max_erase = (min_erase + (len >> 1)).min(len);
    let count = rng.random_range_inclusive(min_erase, max_erase);
    let pos = rng.random_int(len - count + 1);
    Some(splice(data, pos, count, &[]))
}

fn insert_byte(rng: &mut FuzzRng, data: &[u8], max_len: usize) -> Option<Vec<u8>> {
    if data.len() >= max_len {
        return None;
    }
    let pos = rng.random_pos_or_end(data.len());
    let byte = biased_byte(rng);
    Some(splice(data, pos, 0, &[byte]))
}

fn insert_repeated_bytes(rng: &mut FuzzRng, data: &[u8], max_len: usize) -> Option<Vec<u8>> {
    let len = data.len();
    if len + MIN_REPEATED_BYTES >= max_len {
        return None;
    }
    let max_count = (max_len - len).min(MAX_REPEATED_BYTES);
    let count = rng.random_range_inclusive(MIN_REPEATED_BYTES, max_count);
    let pos = rng.random_pos_or_end(len);
    let byte = rng.random_byte();
    Some(splice(data, pos, 0, &vec![byte; count]))
}

fn change_byte(rng: &mut FuzzRng, data: &[u8], max_len: usize) -> Option<Vec<u8>> {
    if data.is_empty() || data.len() > max_len {
        return None;
    }
    let mut out = data.to_vec();
    let pos = rng.random_pos(out.len());
    out[pos] = biased_byte(rng);
    Some(out)
}

fn change_bit(rng: &mut FuzzRng, data: &[u8], max_len: usize) -> Option<Vec<u8>> {
    if data.is_empty() || data.len() > max_len {
        return None;
    }
    let mut out = data.to_vec();
    let pos = rng.random_pos(out.len());
    out[pos] ^= 1 << rng.random_int(8);
    Some(out)
}

fn shuffle_bytes(rng: &mut FuzzRng, data: &[u8], max_len: usize) -> Option<Vec<u8>> {
    let len = data.len();
    if data.is_empty() || len > max_len {
        return None;
    }
    let count = rng.random_int(len.min(MAX_SHUFFLE_WINDOW)) + 1;
    let pos = rng.random_int(len - count + 1);
    let mut out = data.to_vec();
    out[pos..pos + count].shuffle(rng);
    Some(out)
}

fn change_ascii_int(rng: &mut FuzzRng, data: &[u8], max_len: usize) -> Option<Vec<u8>> {
    let len = data.len();
    if data.is_empty() || len > max_len {
        return None;
    }
    let begin = rng.random_pos(len);
    let begin = begin + data[begin..].iter().position(u8::is_ascii_digit)?;
    let end = begin
        + data[begin..]
            .iter()
            .position(|b| !b.is_ascii_digit())
            .unwrap_or(len - begin);

    // Only ASCII digits in the run, so the conversion cannot fail; overlong runs saturate.
    let value = std::str::from_utf8(&data[begin..end])
        .ok()
        .and_then(|digits| digits.parse::<i64>().ok())
        .unwrap_or(i64::MAX);
    let value = match rng.random_int(4) {
        0 => value.saturating_add(1),
        1 => value.saturating_sub(1),
        2 => value >> 1,
        _ => value.wrapping_shl(1),
    };

    let digits = value.to_string();
    if len - (end - begin) + digits.len() > max_len {
        return None;
    }
    Some(splice(data, begin, end - begin, digits.as_bytes()))
}

#[derive(Debug, Clone, Copy)]
enum ByteOrder {
    Little,
    Big,
}

const BIN_INT_LAYOUTS: [(usize, ByteOrder); 7] = [
    (1, ByteOrder::Little),
    (2, ByteOrder::Little),
    (2, ByteOrder::Big),
    (4, ByteOrder::Little),
    (4, ByteOrder::Big),
    (8, ByteOrder::Little),
    (8, ByteOrder::Big),
];

fn read_uint(bytes: &[u8], order: ByteOrder) -> u64 {
    let fold = |acc: u64, b: &u8| acc << 8 | u64::from(*b);
    match order {
        ByteOrder::Big => bytes.iter().fold(0, fold),
        ByteOrder::Little => bytes.iter().rev().fold(0, fold),
    }
}

fn write_uint(bytes: &mut [u8], order: ByteOrder, value: u64) {
    let width = bytes.len();
    for (i, slot) in bytes.iter_mut().enumerate() {
        let shift = match order {
            ByteOrder::Little => i,
            ByteOrder::Big => width - 1 - i,
        };
        *slot = (value >> (8 * shift)) as u8;
    }
}

fn change_bin_int(rng: &mut FuzzRng, data: &[u8], max_len: usize) -> Option<Vec<u8>> {
    let len = data.len();
    if len > max_len {
        return None;
    }
    let (width, order) = BIN_INT_LAYOUTS[rng.random_int(BIN_INT_LAYOUTS.len())];
    if width > len {
        return None;
    }
    let pos = rng.random_int(len - width + 1);
    let value = if pos < LENGTH_FIELD_WINDOW && rng.random_int(4) == 0 {
        len as u64
    } else {
        let current = read_uint(&data[pos..pos + width], order);
        let delta = rng.random_delta(-10, 10);
        let value = current.wrapping_add_signed(delta);
        if delta == 0 && rng.random_bool() {
            value.wrapping_neg()
        } else {
            value
        }
    };
    let mut out = data.to_vec();
    write_uint(&mut out[pos..pos + width], order, value);
    Some(out)
}

/// Overwrites a random window of `to` with bytes of `from`. Both must be non-empty.
fn copy_part_of(rng: &mut FuzzRng, from: &[u8], to: &[u8]) -> Vec<u8> {
    let to_beg = rng.random_pos(to.len());
    let count = (rng.random_int(to.len() - to_beg) + 1).min(from.len());
    let from_beg = rng.random_int(from.len() - count + 1);
    splice(to, to_beg, count, &from[from_beg..from_beg + count])
}

/// Inserts a slice of `from` into `to` without exceeding `max_len`. `from` must be non-empty.
fn insert_part_of(rng: &mut FuzzRng, from: &[u8], to: &[u8], max_len: usize) -> Option<Vec<u8>> {
    if to.len() >= max_len {
        return None;
    }
    let max_count = (max_len - to.len()).min(from.len());
    let count = rng.random_int(max_count) + 1;
    let from_beg = rng.random_int(from.len() - count + 1);
    let pos = rng.random_pos_or_end(to.len());
    Some(splice(to, pos, 0, &from[from_beg..from_beg + count]))
}

/// Alternates runs of `a` and `b` until a random target length is reached.
fn merge_runs(rng: &mut FuzzRng, a: &[u8], b: &[u8], max_len: usize) -> Vec<u8> {
    let target = rng.random_int(max_len) + 1;
    let mut out = Vec::with_capacity(target.min(a.len() + b.len()));
    let (mut pos_a, mut pos_b) = (0, 0);
    let mut use_a = true;
    while out.len() < target && (pos_a < a.len() || pos_b < b.len()) {
        let left = target - out.len();
        let (src, pos) = if use_a {
            (a, &mut pos_a)
        } else {
            (b, &mut pos_b)
        };
        if *pos < src.len() {
            let take = rng.random_int((src.len() - *pos).min(left)) + 1;
            out.extend_from_slice(&src[*pos..*pos + take]);
            *pos += take;
        }
        use_a = !use_a;
    }
    out
}

fn copy_part(rng: &mut FuzzRng, data: &[u8], max_len: usize) -> Option<Vec<u8>> {
    let len = data.len();
    if data.is_empty() || len > max_len {
        return None;
    }
    if len == max_len || rng.random_bool() {
        Some(copy_part_of(rng, data, data))
    } else {
        insert_part_of(rng, data, data, max_len)
    }
}

fn cross_over(rng: &mut FuzzRng, data: &[u8], max_len: usize, other: &[u8]) -> Option<Vec<u8>> {
    let len = data.len();
    if len > max_len || data.is_empty() || other.is_empty() {
        return None;
    }
    match rng.random_int(3) {
        0 => Some(merge_runs(rng, data, other, max_len)),
        1 if len < max_len => insert_part_of(rng, other, data, max_len),
        _ => Some(copy_part_of(rng, other, data)),
    }
}

fn dictionary_word(
    rng: &mut FuzzRng,
    dictionary: &Dictionary,
    data: &[u8],
    max_len: usize,
) -> Option<Vec<u8>> {
    let len = data.len();
    if len > max_len {
        return None;
    }
    let word = dictionary.choose(rng)?;
    if rng.random_bool() {
        if len + word.len() > max_len {
            return None;
        }
        let pos = rng.random_pos_or_end(len);
        Some(splice(data, pos, 0, word))
    } else {
        if word.len() > len {
            return None;
        }
        let pos = rng.random_int(len - word.len() + 1);
        Some(splice(data, pos, word.len(), word))
    }
}
