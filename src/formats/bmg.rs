//! BMG message containers
//!
//! A BMG holds a table of messages (INF1) pointing into a string-data pool
//! (DAT1), plus optional script sections (FLW1/FLI1) that are carried
//! opaquely. Text may be cp1252, UTF-16 (in the container's byte order),
//! Shift-JIS, or UTF-8. Inline escape sequences start with U+001A and are
//! length-prefixed.

use encoding_rs::{SHIFT_JIS, WINDOWS_1252};

use crate::bytes::{ByteCursor, Endianness};
use crate::error::{Error, Result};

/// The text encodings a BMG may declare.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[repr(u8)]
pub enum BmgEncoding {
    Cp1252 = 1,
    #[default]
    Utf16 = 2,
    ShiftJis = 3,
    Utf8 = 4,
}

impl BmgEncoding {
    fn from_u8(value: u8) -> Result<Self> {
        match value {
            1 => Ok(Self::Cp1252),
            2 => Ok(Self::Utf16),
            3 => Ok(Self::ShiftJis),
            4 => Ok(Self::Utf8),
            _ => Err(Error::MalformedBmg(format!(
                "unknown encoding value {value}"
            ))),
        }
    }

    /// Width of one code unit in bytes.
    fn char_width(self) -> usize {
        if self == Self::Utf16 {
            2
        } else {
            1
        }
    }
}

/// One piece of a message: literal text, or an escape sequence.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MessagePart {
    Text(String),
    /// An U+001A escape: a type byte plus opaque parameter bytes.
    Escape { kind: u8, data: Vec<u8> },
}

/// A single message in a BMG file.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Message {
    /// Opaque per-message attribute bytes from INF1 (length is uniform
    /// across the file).
    pub info: Vec<u8>,
    pub parts: Vec<MessagePart>,
    /// A null message: its INF1 entry points at DAT1 offset 0.
    pub is_null: bool,
}

impl Message {
    /// Create a plain-text message with empty info bytes.
    #[must_use]
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            info: Vec::new(),
            parts: vec![MessagePart::Text(text.into())],
            is_null: false,
        }
    }
}

/// A BMG file.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Bmg {
    pub messages: Vec<Message>,
    /// FLW1 script instructions, 8 bytes each.
    pub instructions: Vec<[u8; 8]>,
    /// FLW1 labels: (bmg file ID, instruction index).
    pub labels: Vec<(i8, i16)>,
    /// FLI1 script table: (script ID, first instruction index).
    pub scripts: Vec<(u32, u16)>,

    pub id: u32,
    pub encoding: BmgEncoding,
    pub big_endian: bool,
    pub unk14: u32,
    pub unk18: u32,
    pub unk1c: u32,
}

impl Bmg {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a BMG from a list of messages.
    #[must_use]
    pub fn from_messages(messages: Vec<Message>) -> Self {
        Self {
            messages,
            ..Self::default()
        }
    }

    fn endianness(&self) -> Endianness {
        if self.big_endian {
            Endianness::Big
        } else {
            Endianness::Little
        }
    }

    /// Encode one string in the file encoding.
    fn encode_text(&self, text: &str) -> Vec<u8> {
        match self.encoding {
            BmgEncoding::Cp1252 => WINDOWS_1252.encode(text).0.into_owned(),
            BmgEncoding::ShiftJis => SHIFT_JIS.encode(text).0.into_owned(),
            BmgEncoding::Utf8 => text.as_bytes().to_vec(),
            BmgEncoding::Utf16 => {
                let mut out = Vec::with_capacity(text.len() * 2);
                for unit in text.encode_utf16() {
                    let bytes = if self.big_endian {
                        unit.to_be_bytes()
                    } else {
                        unit.to_le_bytes()
                    };
                    out.extend_from_slice(&bytes);
                }
                out
            }
        }
    }

    fn decode_text(&self, bytes: &[u8]) -> String {
        match self.encoding {
            BmgEncoding::Cp1252 => WINDOWS_1252.decode(bytes).0.into_owned(),
            BmgEncoding::ShiftJis => SHIFT_JIS.decode(bytes).0.into_owned(),
            BmgEncoding::Utf8 => String::from_utf8_lossy(bytes).into_owned(),
            BmgEncoding::Utf16 => {
                let units: Vec<u16> = bytes
                    .chunks_exact(2)
                    .map(|pair| {
                        if self.big_endian {
                            u16::from_be_bytes([pair[0], pair[1]])
                        } else {
                            u16::from_le_bytes([pair[0], pair[1]])
                        }
                    })
                    .collect();
                String::from_utf16_lossy(&units)
            }
        }
    }

    /// The encoded U+001A escape introducer.
    fn escape_start(&self) -> Vec<u8> {
        self.encode_text("\u{1A}")
    }

    fn null_char(&self) -> Vec<u8> {
        self.encode_text("\0")
    }

    /// Parse a BMG file.
    ///
    /// # Errors
    /// Returns an error on a bad magic, unknown encoding, or unknown
    /// section.
    #[allow(clippy::too_many_lines)]
    pub fn from_bytes(data: &[u8]) -> Result<Self> {
        if data.len() < 0x20 || &data[..8] != b"MESGbmg1" {
            return Err(Error::InvalidMagic {
                expected: "MESGbmg1",
                found: data.iter().take(8).copied().collect(),
            });
        }

        // Some games use big-endian BMGs; the size field read both ways
        // makes the byte order obvious.
        let size_le = u32::from_le_bytes(data[8..12].try_into().unwrap());
        let size_be = u32::from_be_bytes(data[8..12].try_into().unwrap());
        let big_endian = size_le >= size_be;

        let mut bmg = Self {
            big_endian,
            ..Self::default()
        };
        let endianness = bmg.endianness();

        let mut cursor = ByteCursor::new(data, endianness);
        cursor.seek(8)?;
        let _total_size = cursor.read_u32()?;
        let section_count = cursor.read_u32()?;
        bmg.encoding = BmgEncoding::from_u8(cursor.read_u8()?)?;
        bmg.unk14 = cursor.read_u32()?;
        bmg.unk18 = cursor.read_u32()?;
        bmg.unk1c = cursor.read_u32()?;

        let mut inf1: Vec<(usize, Vec<u8>)> = Vec::new();
        let mut dat1: &[u8] = &[];

        let mut offset = 0x20usize;
        for _ in 0..section_count {
            let mut section = ByteCursor::new(data, endianness);
            section.seek(offset)?;
            let magic = section.read_array::<4>()?;
            let length = section.read_u32()? as usize;

            match &magic {
                b"INF1" => {
                    let count = usize::from(section.read_u16()?);
                    let entry_length = usize::from(section.read_u16()?);
                    bmg.id = section.read_u32()?;
                    for i in 0..count {
                        let entry_offset = offset + 16 + i * entry_length;
                        let mut entry = ByteCursor::new(data, endianness);
                        entry.seek(entry_offset)?;
                        let text_offset = entry.read_u32()? as usize;
                        let attribs = entry.read_bytes(entry_length - 4)?.to_vec();
                        inf1.push((text_offset, attribs));
                    }
                }
                b"DAT1" => {
                    let end = (offset + length).min(data.len());
                    dat1 = &data[offset + 8..end];
                }
                b"FLW1" => {
                    let instruction_count = usize::from(section.read_u16()?);
                    let label_count = usize::from(section.read_u16()?);
                    let _unk0c = section.read_u32()?;

                    let instructions_offset = offset + 16;
                    for i in 0..instruction_count {
                        let mut inst = ByteCursor::new(data, endianness);
                        inst.seek(instructions_offset + i * 8)?;
                        let command = inst.read_array::<8>()?;
                        if command != [0; 8] {
                            bmg.instructions.push(command);
                        }
                    }

                    let indices_offset = instructions_offset + instruction_count * 8;
                    let ids_offset = indices_offset + label_count * 2;
                    for i in 0..label_count {
                        let mut index_cursor = ByteCursor::new(data, endianness);
                        index_cursor.seek(indices_offset + i * 2)?;
                        let index = index_cursor.read_i16()?;
                        let mut id_cursor = ByteCursor::new(data, endianness);
                        id_cursor.seek(ids_offset + i)?;
                        let bmg_id = id_cursor.read_i8()?;
                        if bmg_id != 0 || index != 0 {
                            bmg.labels.push((bmg_id, index));
                        }
                    }
                }
                b"FLI1" => {
                    let count = usize::from(section.read_u16()?);
                    let entry_length = usize::from(section.read_u16()?);
                    if entry_length != 8 {
                        return Err(Error::MalformedBmg(format!(
                            "unexpected FLI1 entry length {entry_length}"
                        )));
                    }
                    let _unk0c = section.read_u32()?;
                    for i in 0..count {
                        let mut entry = ByteCursor::new(data, endianness);
                        entry.seek(offset + 16 + i * 8)?;
                        let id = entry.read_u32()?;
                        let index = entry.read_u16()?;
                        bmg.scripts.push((id, index));
                    }
                }
                _ => {
                    return Err(Error::MalformedBmg(format!(
                        "unknown section {:?}",
                        String::from_utf8_lossy(&magic)
                    )))
                }
            }
            offset += length;
        }

        // Decode the messages out of DAT1.
        let null_char = bmg.null_char();
        let escape_start = bmg.escape_start();
        let width = bmg.encoding.char_width();

        for (entry_offset, attribs) in inf1 {
            let mut parts = Vec::new();
            let mut offset = entry_offset;
            let mut text_start = offset;

            loop {
                let next = dat1.get(offset..offset + width).unwrap_or(&[]);
                if next.is_empty() || next == null_char.as_slice() {
                    break;
                }
                if next == escape_start.as_slice() {
                    if text_start != 0 && text_start != offset {
                        parts.push(MessagePart::Text(
                            bmg.decode_text(&dat1[text_start..offset]),
                        ));
                    }
                    let escape_len = usize::from(*dat1.get(offset + width).ok_or(
                        Error::MalformedBmg("escape sequence is truncated".into()),
                    )?);
                    let kind = *dat1.get(offset + width + 1).ok_or(Error::MalformedBmg(
                        "escape sequence is truncated".into(),
                    ))?;
                    let data_end = (offset + escape_len).min(dat1.len());
                    let escape_data = dat1
                        .get(offset + width + 2..data_end)
                        .unwrap_or_default()
                        .to_vec();
                    parts.push(MessagePart::Escape {
                        kind,
                        data: escape_data,
                    });
                    offset += escape_len.max(width);
                    text_start = offset;
                } else {
                    offset += width;
                }
            }

            if text_start != 0 && text_start != offset {
                parts.push(MessagePart::Text(bmg.decode_text(&dat1[text_start..offset])));
            }

            bmg.messages.push(Message {
                info: attribs,
                parts,
                is_null: offset == 0,
            });
        }

        Ok(bmg)
    }

    /// Generate file data representing this BMG.
    ///
    /// # Errors
    /// Returns an error if a message embeds a NUL or U+001A character, the
    /// messages disagree on info length, or an instruction is not 8 bytes.
    #[allow(clippy::too_many_lines, clippy::cast_possible_truncation)]
    pub fn save(&self) -> Result<Vec<u8>> {
        let write_u32 = |out: &mut Vec<u8>, v: u32| {
            if self.big_endian {
                out.extend_from_slice(&v.to_be_bytes());
            } else {
                out.extend_from_slice(&v.to_le_bytes());
            }
        };
        let write_u16 = |out: &mut Vec<u8>, v: u16| {
            if self.big_endian {
                out.extend_from_slice(&v.to_be_bytes());
            } else {
                out.extend_from_slice(&v.to_le_bytes());
            }
        };

        let mut instruction_count = self.instructions.len();
        if instruction_count % 2 != 0 {
            instruction_count += 1;
        }
        let label_count = self.labels.len().div_ceil(8) * 8;

        let mut inf1: Vec<u8> = vec![0; 16];
        let mut dat1: Vec<u8> = vec![0; 8];
        let mut flw1: Vec<u8> = vec![0; 16];
        let mut fli1: Vec<u8> = vec![0; 16];

        dat1.extend_from_slice(&self.null_char());

        let info_len = self.messages.first().map_or(0, |m| m.info.len());
        for (i, message) in self.messages.iter().enumerate() {
            if message.info.len() != info_len {
                return Err(Error::MalformedBmg(format!(
                    "message info values are presumed to be {info_len} bytes long, but \
                     message {i} has a {}-byte-long info value",
                    message.info.len()
                )));
            }

            let offset = if message.is_null {
                0
            } else {
                (dat1.len() - 8) as u32
            };
            write_u32(&mut inf1, offset);
            inf1.extend_from_slice(&message.info);

            if !message.is_null {
                self.encode_message(message, &mut dat1)?;
            }
        }

        for instruction in &self.instructions {
            flw1.extend_from_slice(instruction);
        }
        while flw1.len() % 16 != 0 {
            flw1.extend_from_slice(&[0; 8]);
        }
        for &(_, index) in &self.labels {
            write_u16(&mut flw1, index as u16);
        }
        for _ in 0..label_count - self.labels.len() {
            flw1.extend_from_slice(&[0, 0]);
        }
        for &(bmg_id, _) in &self.labels {
            flw1.push(bmg_id as u8);
        }

        for &(id, start_index) in &self.scripts {
            write_u32(&mut fli1, id);
            write_u32(&mut fli1, u32::from(start_index));
        }

        // Section lengths are 32-aligned. FLI1's stored bytes are not
        // padded, but the length it declares is.
        while inf1.len() % 32 != 0 {
            inf1.push(0);
        }
        while dat1.len() % 32 != 0 {
            dat1.push(0);
        }
        while flw1.len() % 32 != 0 {
            flw1.push(0);
        }
        let fli1_claimed_len = fli1.len().div_ceil(32) * 32;

        let info_entry_len = (4 + info_len) as u16;
        let patch_header = |section: &mut [u8], magic: &[u8; 4], len: u32| {
            section[0..4].copy_from_slice(magic);
            let bytes = if self.big_endian {
                len.to_be_bytes()
            } else {
                len.to_le_bytes()
            };
            section[4..8].copy_from_slice(&bytes);
        };
        let inf1_len = inf1.len() as u32;
        let dat1_len = dat1.len() as u32;
        let flw1_len = flw1.len() as u32;
        patch_header(&mut inf1, b"INF1", inf1_len);
        patch_header(&mut dat1, b"DAT1", dat1_len);
        patch_header(&mut flw1, b"FLW1", flw1_len);
        patch_header(&mut fli1, b"FLI1", fli1_claimed_len as u32);

        let mut tail = Vec::new();
        write_u16(&mut tail, self.messages.len() as u16);
        write_u16(&mut tail, info_entry_len);
        write_u32(&mut tail, self.id);
        inf1[8..16].copy_from_slice(&tail);

        tail.clear();
        write_u16(&mut tail, instruction_count as u16);
        write_u16(&mut tail, label_count as u16);
        flw1[8..12].copy_from_slice(&tail);

        tail.clear();
        write_u16(&mut tail, self.scripts.len() as u16);
        write_u16(&mut tail, 8);
        fli1[8..12].copy_from_slice(&tail);

        // Assemble.
        let mut data = vec![0u8; 0x20];
        let mut section_count = 2u32;
        data.extend_from_slice(&inf1);
        data.extend_from_slice(&dat1);
        if !self.instructions.is_empty() || !self.labels.is_empty() {
            section_count += 1;
            data.extend_from_slice(&flw1);
        }
        if !self.scripts.is_empty() {
            section_count += 1;
            data.extend_from_slice(&fli1);
        }

        let total_len = data.len().div_ceil(32) * 32;
        data[0..8].copy_from_slice(b"MESGbmg1");
        let mut header = Vec::new();
        write_u32(&mut header, total_len as u32);
        write_u32(&mut header, section_count);
        header.push(self.encoding as u8);
        write_u32(&mut header, self.unk14);
        write_u32(&mut header, self.unk18);
        write_u32(&mut header, self.unk1c);
        data[8..8 + header.len()].copy_from_slice(&header);

        Ok(data)
    }

    fn encode_message(&self, message: &Message, dat1: &mut Vec<u8>) -> Result<()> {
        for part in &message.parts {
            match part {
                MessagePart::Text(text) => {
                    if text.contains('\0') {
                        return Err(Error::MalformedBmg(
                            "NUL character found in message text".into(),
                        ));
                    }
                    if text.contains('\u{1A}') {
                        return Err(Error::MalformedBmg(
                            "U+001A character found in message text".into(),
                        ));
                    }
                    dat1.extend_from_slice(&self.encode_text(text));
                }
                MessagePart::Escape { kind, data } => {
                    let start = self.escape_start();
                    let total = data.len() + 2 + start.len();
                    dat1.extend_from_slice(&start);
                    dat1.push(total as u8);
                    dat1.push(*kind);
                    dat1.extend_from_slice(data);
                }
            }
        }
        dat1.extend_from_slice(&self.null_char());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn save_matches_reference_layout() {
        let bmg = Bmg::from_messages(vec![
            Message::text("Open your eyes..."),
            Message::text("Wake up, Link..."),
        ]);
        let data = bmg.save().unwrap();

        assert_eq!(&data[..8], b"MESGbmg1");
        // Total size 0xA0, two sections.
        assert_eq!(&data[8..12], &[0xA0, 0x00, 0x00, 0x00]);
        assert_eq!(&data[12..16], &[0x02, 0x00, 0x00, 0x00]);
    }

    #[test]
    fn utf16_round_trips() {
        let bmg = Bmg::from_messages(vec![
            Message::text("Open your eyes..."),
            Message::text("Wake up, Link..."),
        ]);
        let data = bmg.save().unwrap();
        let parsed = Bmg::from_bytes(&data).unwrap();
        assert_eq!(parsed.messages, bmg.messages);
        assert!(!parsed.big_endian);
        assert_eq!(parsed.encoding, BmgEncoding::Utf16);
    }

    #[test]
    fn escapes_round_trip() {
        let mut message = Message::text("price: ");
        message.parts.push(MessagePart::Escape {
            kind: 7,
            data: vec![1, 2, 3],
        });
        message.parts.push(MessagePart::Text(" rupees".into()));

        let bmg = Bmg::from_messages(vec![message]);
        let data = bmg.save().unwrap();
        let parsed = Bmg::from_bytes(&data).unwrap();
        assert_eq!(parsed.messages, bmg.messages);
    }

    #[test]
    fn cp1252_and_utf8_round_trip() {
        for encoding in [BmgEncoding::Cp1252, BmgEncoding::Utf8] {
            let mut bmg = Bmg::from_messages(vec![Message::text("caf\u{E9}")]);
            bmg.encoding = encoding;
            let data = bmg.save().unwrap();
            let parsed = Bmg::from_bytes(&data).unwrap();
            assert_eq!(parsed.encoding, encoding);
            assert_eq!(parsed.messages, bmg.messages);
        }
    }

    #[test]
    fn scripts_and_instructions_round_trip() {
        let mut bmg = Bmg::from_messages(vec![Message::text("hi")]);
        bmg.instructions = vec![[1, 2, 3, 4, 5, 6, 7, 8], [9, 10, 11, 12, 13, 14, 15, 16]];
        bmg.labels = vec![(1, 2), (3, 4)];
        bmg.scripts = vec![(0x1000, 1)];

        let data = bmg.save().unwrap();
        let parsed = Bmg::from_bytes(&data).unwrap();
        assert_eq!(parsed.instructions, bmg.instructions);
        assert_eq!(parsed.labels, bmg.labels);
        assert_eq!(parsed.scripts, bmg.scripts);
    }

    #[test]
    fn null_messages_survive() {
        let bmg = Bmg::from_messages(vec![
            Message {
                info: Vec::new(),
                parts: Vec::new(),
                is_null: true,
            },
            Message::text("real"),
        ]);
        let data = bmg.save().unwrap();
        let parsed = Bmg::from_bytes(&data).unwrap();
        assert!(parsed.messages[0].is_null);
        assert!(!parsed.messages[1].is_null);
        assert_eq!(parsed.messages[1].parts, vec![MessagePart::Text("real".into())]);
    }

    #[test]
    fn rejects_nul_in_text() {
        let bmg = Bmg::from_messages(vec![Message::text("bad\0text")]);
        assert!(bmg.save().is_err());
    }

    #[test]
    fn big_endian_bmg_round_trips() {
        let mut bmg = Bmg::from_messages(vec![Message::text("peach")]);
        bmg.big_endian = true;
        let data = bmg.save().unwrap();
        let parsed = Bmg::from_bytes(&data).unwrap();
        assert!(parsed.big_endian);
        assert_eq!(parsed.messages, bmg.messages);
    }
}
