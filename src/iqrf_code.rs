//! The IQRF Code: the printable base-57 encoding SmartConnect accepts as
//! input, carrying a nibble-tagged stream of MID/IBK/HWPID objects.

use thiserror::Error;

const BASE57: u64 = 57;
const ALPHABET: &str = "123456789ABCDEFGHJKLMNPQRSTUVWXYZabcdefghijkmnopqrstvwxyz";
const MAXIMUM_PIECE57_LENGTH: usize = 11;

/// Byte count produced by each possible base-57 piece length, indexed by
/// piece length: `PIECE57_LENGTHS[i]` is the byte count a group of
/// `PIECE57_LENGTHS[i]` base-57 characters decodes to, for
/// `i` = number of trailing bytes 0..=8.
const PIECE57_LENGTHS: [usize; 9] = [0, 2, 3, 5, 6, 7, 9, 10, MAXIMUM_PIECE57_LENGTH];

/// Errors decoding or encoding an IQRF Code.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum IqrfCodeError {
    /// The code was the empty string.
    #[error("IQRF Code cannot be empty")]
    Empty,
    /// The trailing check character didn't match.
    #[error("IQRF Code ends with an incorrect check character")]
    BadCheckChar,
    /// A character outside the base-57 alphabet appeared at `position`.
    #[error("IQRF Code contains an invalid character at position {position}")]
    InvalidChar {
        /// Index (in characters, excluding the check character) of the
        /// offending character.
        position: usize,
    },
    /// The code's length (excluding the check character) is not
    /// congruent with any valid piece length.
    #[error("IQRF Code has an incorrect length")]
    BadLength,
    /// A tag nibble outside `0..=7` appeared in the decoded stream.
    #[error("IQRF Code contains an unknown tag value {0:#x}")]
    UnknownTag(u8),
    /// The nibble stream ended before a tag's expected payload was read.
    #[error("IQRF Code stream ended while reading tag payload")]
    TruncatedStream,
}

/// The nibble-tagged objects an IQRF Code's decoded byte stream can carry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Tag {
    /// Marks the end of the nibble stream.
    End = 0x0,
    /// 4-byte module id follows.
    Mid = 0x1,
    /// 16-byte individual bonding key follows.
    Ibk = 0x2,
    /// 2-byte HWPID follows.
    Hwpid = 0x3,
    /// Obsolete; carries no payload and is ignored.
    BondingChannel = 0x4,
    /// No-op; carries no payload.
    Nop = 0x5,
    /// Non-IQRF data block; this decoder does not consume a payload for
    /// it, matching the reference decoder's behavior.
    DataBlock = 0x6,
    /// Non-IQRF text; same no-payload behavior as `DataBlock`.
    Text = 0x7,
}

impl Tag {
    fn from_nibble(nibble: u8) -> Result<Self, IqrfCodeError> {
        match nibble {
            0x0 => Ok(Tag::End),
            0x1 => Ok(Tag::Mid),
            0x2 => Ok(Tag::Ibk),
            0x3 => Ok(Tag::Hwpid),
            0x4 => Ok(Tag::BondingChannel),
            0x5 => Ok(Tag::Nop),
            0x6 => Ok(Tag::DataBlock),
            0x7 => Ok(Tag::Text),
            other => Err(IqrfCodeError::UnknownTag(other)),
        }
    }
}

/// The objects decoded out of a SmartConnect IQRF Code.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DecodedCode {
    /// 4-byte module id, if a MID tag was present.
    pub mid: Option<[u8; 4]>,
    /// 16-byte individual bonding key, if an IBK tag was present.
    pub ibk: Option<[u8; 16]>,
    /// HWPID, if an HWPID tag was present.
    pub hwpid: Option<u16>,
}

fn alphabet_index(ch: char) -> Option<u64> {
    ALPHABET.find(ch).map(|i| i as u64)
}

fn check_char(text: &str) -> char {
    let chars: Vec<char> = text.chars().collect();
    let mut sum: u64 = 0;
    let mut factor: u64 = 2;
    for ch in chars.iter().rev() {
        let index = alphabet_index(*ch).unwrap_or(0);
        let addend = factor * index;
        sum += addend / BASE57 + (addend % BASE57);
        factor = 3 - factor;
    }
    let position = ((BASE57 - (sum % BASE57)) % BASE57) as usize;
    ALPHABET.chars().nth(position).expect("position is within alphabet bounds")
}

fn piece_len_index(piece57_len: usize) -> Option<usize> {
    PIECE57_LENGTHS.iter().position(|&len| len == piece57_len)
}

/// Decodes the base-57 character groups of `code` (without its trailing
/// check character) into the raw byte stream consumed by the nibble
/// reader.
fn decode_groups(code: &str) -> Result<Vec<u8>, IqrfCodeError> {
    let chars: Vec<char> = code.chars().collect();
    let last_piece_len = chars.len() % MAXIMUM_PIECE57_LENGTH;
    let last_index = piece_len_index(last_piece_len).ok_or(IqrfCodeError::BadLength)?;

    let full_groups = chars.len() / MAXIMUM_PIECE57_LENGTH;
    let mut result = vec![0u8; 8 * full_groups + last_index];

    let mut piece_index = 0usize;
    let mut group_start = 0usize;
    while group_start < chars.len() {
        let piece_len = MAXIMUM_PIECE57_LENGTH.min(chars.len() - group_start);
        let mut piece: u64 = 0;
        for offset in (0..piece_len).rev() {
            let ch = chars[group_start + offset];
            let index = alphabet_index(ch).ok_or(IqrfCodeError::InvalidChar { position: group_start + offset })?;
            piece = piece * BASE57 + index;
        }

        let byte_count = piece_len_index(piece_len).ok_or(IqrfCodeError::BadLength)?;
        for byte_offset in (0..byte_count).rev() {
            result[piece_index + byte_offset] = (piece & 0xFF) as u8;
            piece >>= 8;
        }

        group_start += MAXIMUM_PIECE57_LENGTH;
        piece_index += 8;
    }

    Ok(result)
}

struct NibbleReader<'a> {
    stream: &'a [u8],
    nibble_index: usize,
}

impl<'a> NibbleReader<'a> {
    fn new(stream: &'a [u8]) -> Self {
        Self { stream, nibble_index: 0 }
    }

    fn read_nibble(&mut self) -> Result<u8, IqrfCodeError> {
        let stream_index = self.nibble_index / 2;
        let byte = *self.stream.get(stream_index).ok_or(IqrfCodeError::TruncatedStream)?;
        let nibble = if self.nibble_index % 2 == 1 { byte >> 4 } else { byte };
        self.nibble_index += 1;
        Ok(nibble & 0x0F)
    }

    fn read_byte(&mut self) -> Result<u8, IqrfCodeError> {
        let low = self.read_nibble()?;
        let high = self.read_nibble()?;
        Ok(low | (high << 4))
    }

    fn read_bytes<const N: usize>(&mut self) -> Result<[u8; N], IqrfCodeError> {
        let mut out = [0u8; N];
        for slot in &mut out {
            *slot = self.read_byte()?;
        }
        Ok(out)
    }
}

/// Decodes a SmartConnect IQRF Code string.
pub fn decode(code: &str) -> Result<DecodedCode, IqrfCodeError> {
    if code.is_empty() {
        return Err(IqrfCodeError::Empty);
    }

    let mut chars: Vec<char> = code.chars().collect();
    let expected_check = chars.pop().expect("non-empty");
    let body: String = chars.into_iter().collect();

    if check_char(&body) != expected_check {
        return Err(IqrfCodeError::BadCheckChar);
    }

    let stream = decode_groups(&body)?;
    let mut reader = NibbleReader::new(&stream);
    let mut decoded = DecodedCode::default();

    loop {
        let tag = Tag::from_nibble(reader.read_nibble()?)?;
        match tag {
            Tag::End => break,
            Tag::Mid => decoded.mid = Some(reader.read_bytes::<4>()?),
            Tag::Ibk => decoded.ibk = Some(reader.read_bytes::<16>()?),
            Tag::Hwpid => {
                let high = reader.read_byte()?;
                let low = reader.read_byte()?;
                decoded.hwpid = Some(u16::from(high) << 8 | u16::from(low));
            }
            Tag::BondingChannel | Tag::Nop | Tag::DataBlock | Tag::Text => {}
        }
    }

    Ok(decoded)
}

/// Encodes `decoded` back into an IQRF Code string, the inverse of
/// [`decode`]. Produces a MID/IBK/HWPID-in-that-order stream terminated
/// by `Tag::End`, which is what every real encoder emits even though the
/// decoder accepts any order.
#[must_use]
pub fn encode(decoded: &DecodedCode) -> String {
    let mut nibbles: Vec<u8> = Vec::new();
    let mut push_byte = |nibbles: &mut Vec<u8>, byte: u8| {
        nibbles.push(byte & 0x0F);
        nibbles.push(byte >> 4);
    };

    if let Some(mid) = decoded.mid {
        nibbles.push(Tag::Mid as u8);
        for byte in mid {
            push_byte(&mut nibbles, byte);
        }
    }
    if let Some(ibk) = decoded.ibk {
        nibbles.push(Tag::Ibk as u8);
        for byte in ibk {
            push_byte(&mut nibbles, byte);
        }
    }
    if let Some(hwpid) = decoded.hwpid {
        nibbles.push(Tag::Hwpid as u8);
        push_byte(&mut nibbles, (hwpid >> 8) as u8);
        push_byte(&mut nibbles, (hwpid & 0xFF) as u8);
    }
    nibbles.push(Tag::End as u8);

    if nibbles.len() % 2 == 1 {
        nibbles.push(Tag::End as u8);
    }

    let bytes: Vec<u8> = nibbles.chunks_exact(2).map(|pair| pair[0] | (pair[1] << 4)).collect();

    let mut body = String::new();
    for chunk in bytes.chunks(8) {
        let byte_count = chunk.len();
        let index = piece_len_index(byte_count).expect("chunk sizes are always 1..=8");
        let piece_len = PIECE57_LENGTHS[index + 0]; // number of base-57 chars for this byte count
        let piece_len = if byte_count == 8 { MAXIMUM_PIECE57_LENGTH } else { piece_len };

        let mut piece: u64 = 0;
        for &byte in chunk {
            piece = (piece << 8) | u64::from(byte);
        }

        let mut group = vec!['1'; piece_len];
        for slot in group.iter_mut() {
            let digit = (piece % BASE57) as usize;
            *slot = ALPHABET.chars().nth(digit).expect("digit is within alphabet bounds");
            piece /= BASE57;
        }
        body.extend(group);
    }

    let check = check_char(&body);
    body.push(check);
    body
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encode_then_decode_round_trips_mid_ibk_hwpid() {
        let decoded = DecodedCode {
            mid: Some([0x01, 0x02, 0x03, 0x04]),
            ibk: Some([0xAA; 16]),
            hwpid: Some(0x1234),
        };
        let code = encode(&decoded);
        let round_tripped = decode(&code).unwrap();
        assert_eq!(round_tripped, decoded);
    }

    #[test]
    fn decode_rejects_empty_code() {
        assert_eq!(decode(""), Err(IqrfCodeError::Empty));
    }

    #[test]
    fn decode_rejects_tampered_check_character() {
        let decoded = DecodedCode { mid: Some([1, 2, 3, 4]), ibk: None, hwpid: None };
        let mut code = encode(&decoded);
        code.pop();
        code.push('9');
        let err = decode(&code);
        assert!(matches!(err, Err(IqrfCodeError::BadCheckChar) | Err(IqrfCodeError::InvalidChar { .. })));
    }

    #[test]
    fn decode_rejects_unknown_tag() {
        // A single full byte 0xE8 decodes to nibble stream [8, E]; tag
        // nibble 8 is outside 0..=7.
        let body_bytes = [0xE8u8];
        let mut piece: u64 = u64::from(body_bytes[0]);
        let mut group = vec!['1'; 2];
        for slot in group.iter_mut() {
            let digit = (piece % BASE57) as usize;
            *slot = ALPHABET.chars().nth(digit).unwrap();
            piece /= BASE57;
        }
        let body: String = group.into_iter().collect();
        let mut code = body.clone();
        code.push(check_char(&body));
        assert!(matches!(decode(&code), Err(IqrfCodeError::UnknownTag(0x8))));
    }

    #[test]
    fn bonding_channel_tag_is_ignored() {
        let mut nibbles = vec![Tag::BondingChannel as u8, Tag::End as u8];
        if nibbles.len() % 2 == 1 {
            nibbles.push(Tag::End as u8);
        }
        let bytes: Vec<u8> = nibbles.chunks_exact(2).map(|pair| pair[0] | (pair[1] << 4)).collect();
        let index = piece_len_index(bytes.len()).unwrap();
        let piece_len = PIECE57_LENGTHS[index];
        let mut piece: u64 = 0;
        for &byte in &bytes {
            piece = (piece << 8) | u64::from(byte);
        }
        let mut group = vec!['1'; piece_len];
        for slot in group.iter_mut() {
            let digit = (piece % BASE57) as usize;
            *slot = ALPHABET.chars().nth(digit).unwrap();
            piece /= BASE57;
        }
        let body: String = group.into_iter().collect();
        let mut code = body.clone();
        code.push(check_char(&body));
        let decoded = decode(&code).unwrap();
        assert_eq!(decoded, DecodedCode::default());
    }
}
