//! Decoder for Diablo II `.d2s` character files.
//!
//! Decodes the fixed-size header, the `gf` attribute section and the `if`
//! skill section. Items and everything after them are left untouched. The
//! layout is the one written by game versions 1.10 through 1.14 (file
//! version 96).

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Magic number every save file starts with.
pub const SIGNATURE: u32 = 0xAA55_AA55;
/// File version written by 1.10 - 1.14d.
pub const SUPPORTED_VERSION: u32 = 96;
/// Length of the character header preceding the `gf` attribute section.
pub const HEADER_LEN: usize = 765;

const OFFSET_SIGNATURE: usize = 0x00;
const OFFSET_VERSION: usize = 0x04;
const OFFSET_FILE_SIZE: usize = 0x08;
const OFFSET_CHECKSUM: usize = 0x0C;
const OFFSET_ACTIVE_WEAPON: usize = 0x10;
const OFFSET_NAME: usize = 0x14;
const NAME_LEN: usize = 16;
const OFFSET_STATUS: usize = 0x24;
const OFFSET_PROGRESSION: usize = 0x25;
const OFFSET_CLASS: usize = 0x28;
const OFFSET_LEVEL: usize = 0x2B;
const OFFSET_LAST_PLAYED: usize = 0x30;

const ATTRIBUTES_MARKER: &[u8; 2] = b"gf";
const SKILLS_MARKER: &[u8; 2] = b"if";
const SKILL_COUNT: usize = 30;
const ATTRIBUTE_ID_BITS: usize = 9;
const ATTRIBUTE_END: u32 = 0x1ff;

const STATUS_HARDCORE: u8 = 0x04;
const STATUS_DIED: u8 = 0x08;
const STATUS_EXPANSION: u8 = 0x20;
const STATUS_LADDER: u8 = 0x40;

/// Playable classes in the order the game encodes them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CharacterClass {
    Amazon,
    Sorceress,
    Necromancer,
    Paladin,
    Barbarian,
    Druid,
    Assassin,
}

impl CharacterClass {
    pub fn from_byte(value: u8) -> Option<Self> {
        match value {
            0 => Some(Self::Amazon),
            1 => Some(Self::Sorceress),
            2 => Some(Self::Necromancer),
            3 => Some(Self::Paladin),
            4 => Some(Self::Barbarian),
            5 => Some(Self::Druid),
            6 => Some(Self::Assassin),
            _ => None,
        }
    }

    pub fn as_byte(self) -> u8 {
        self as u8
    }

    /// Id of the first class skill; the 30 skill bytes follow this order.
    pub fn first_skill(self) -> u16 {
        match self {
            Self::Amazon => 6,
            Self::Sorceress => 36,
            Self::Necromancer => 66,
            Self::Paladin => 96,
            Self::Barbarian => 126,
            Self::Druid => 221,
            Self::Assassin => 251,
        }
    }
}

/// Flags stored in the status byte.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CharacterStatus {
    pub hardcore: bool,
    pub died: bool,
    pub expansion: bool,
    pub ladder: bool,
}

impl CharacterStatus {
    fn from_byte(value: u8) -> Self {
        Self {
            hardcore: value & STATUS_HARDCORE != 0,
            died: value & STATUS_DIED != 0,
            expansion: value & STATUS_EXPANSION != 0,
            ladder: value & STATUS_LADDER != 0,
        }
    }
}

/// Decoded character save: header fields, attributes and skills.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SaveFile {
    pub version: u32,
    pub file_size: u32,
    pub checksum: u32,
    pub active_weapon: u32,
    pub name: String,
    pub status: CharacterStatus,
    pub progression: u8,
    pub class: CharacterClass,
    pub level: u8,
    /// Unix timestamp (seconds) of the last time the character was played.
    pub last_played: u32,
    #[serde(default)]
    pub attributes: Attributes,
    #[serde(default)]
    pub skills: Vec<Skill>,
}

/// Values from the `gf` section. Attributes the file omits are zero.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Attributes {
    pub strength: u32,
    pub energy: u32,
    pub dexterity: u32,
    pub vitality: u32,
    pub unused_stats: u32,
    pub unused_skill_points: u32,
    pub current_hp: u32,
    pub max_hp: u32,
    pub current_mana: u32,
    pub max_mana: u32,
    pub current_stamina: u32,
    pub max_stamina: u32,
    pub level: u32,
    pub experience: u32,
    pub gold: u32,
    pub stashed_gold: u32,
}

impl Attributes {
    /// Bit width of the value stored for attribute `id`.
    fn width(id: u32) -> Option<usize> {
        match id {
            0..=4 => Some(10),
            5 => Some(8),
            6..=11 => Some(21),
            12 => Some(7),
            13 => Some(32),
            14 | 15 => Some(25),
            _ => None,
        }
    }

    fn set(&mut self, id: u32, raw: u32) {
        // Life, mana and stamina are fixed point with 8 fractional bits.
        let whole = raw >> 8;
        match id {
            0 => self.strength = raw,
            1 => self.energy = raw,
            2 => self.dexterity = raw,
            3 => self.vitality = raw,
            4 => self.unused_stats = raw,
            5 => self.unused_skill_points = raw,
            6 => self.current_hp = whole,
            7 => self.max_hp = whole,
            8 => self.current_mana = whole,
            9 => self.max_mana = whole,
            10 => self.current_stamina = whole,
            11 => self.max_stamina = whole,
            12 => self.level = raw,
            13 => self.experience = raw,
            14 => self.gold = raw,
            _ => self.stashed_gold = raw,
        }
    }
}

/// Points invested in one class skill.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Skill {
    pub id: u16,
    pub points: u8,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum D2sError {
    #[error("file is {0} bytes, shorter than the character header")]
    Truncated(usize),
    #[error("bad signature {0:#010x}")]
    Signature(u32),
    #[error("unsupported file version {0}")]
    UnsupportedVersion(u32),
    #[error("header declares {declared} bytes but file is {actual} bytes")]
    FileSize { declared: u32, actual: usize },
    #[error("checksum mismatch: header {stored:#010x}, computed {computed:#010x}")]
    Checksum { stored: u32, computed: u32 },
    #[error("unknown class byte {0}")]
    UnknownClass(u8),
    #[error("character name is not valid ascii")]
    InvalidName,
    #[error("expected {0} section marker")]
    MissingSection(&'static str),
    #[error("{0} section runs past the end of the file")]
    SectionTruncated(&'static str),
    #[error("unknown attribute id {0}")]
    UnknownAttribute(u32),
}

/// Decodes a complete `.d2s` file.
pub fn decode(data: &[u8]) -> Result<SaveFile, D2sError> {
    if data.len() < HEADER_LEN {
        return Err(D2sError::Truncated(data.len()));
    }

    let signature = read_u32(data, OFFSET_SIGNATURE);
    if signature != SIGNATURE {
        return Err(D2sError::Signature(signature));
    }

    let version = read_u32(data, OFFSET_VERSION);
    if version != SUPPORTED_VERSION {
        return Err(D2sError::UnsupportedVersion(version));
    }

    let file_size = read_u32(data, OFFSET_FILE_SIZE);
    if file_size as usize != data.len() {
        return Err(D2sError::FileSize {
            declared: file_size,
            actual: data.len(),
        });
    }

    let stored = read_u32(data, OFFSET_CHECKSUM);
    let computed = checksum(data);
    if stored != computed {
        return Err(D2sError::Checksum { stored, computed });
    }

    let class_byte = data[OFFSET_CLASS];
    let class = CharacterClass::from_byte(class_byte).ok_or(D2sError::UnknownClass(class_byte))?;

    let (attributes, skills_offset) = read_attributes(data)?;
    let skills = read_skills(data, skills_offset, class)?;

    Ok(SaveFile {
        version,
        file_size,
        checksum: stored,
        active_weapon: read_u32(data, OFFSET_ACTIVE_WEAPON),
        name: read_name(&data[OFFSET_NAME..OFFSET_NAME + NAME_LEN])?,
        status: CharacterStatus::from_byte(data[OFFSET_STATUS]),
        progression: data[OFFSET_PROGRESSION],
        class,
        level: data[OFFSET_LEVEL],
        last_played: read_u32(data, OFFSET_LAST_PLAYED),
        attributes,
        skills,
    })
}

/// Reads the `gf` section; returns the byte offset right after it.
fn read_attributes(data: &[u8]) -> Result<(Attributes, usize), D2sError> {
    let body = expect_marker(data, HEADER_LEN, ATTRIBUTES_MARKER, "attributes")?;
    let mut bits = BitReader::new(body);
    let mut attributes = Attributes::default();

    loop {
        let id = bits
            .read(ATTRIBUTE_ID_BITS)
            .ok_or(D2sError::SectionTruncated("attributes"))?;
        if id == ATTRIBUTE_END {
            break;
        }
        let width = Attributes::width(id).ok_or(D2sError::UnknownAttribute(id))?;
        let value = bits
            .read(width)
            .ok_or(D2sError::SectionTruncated("attributes"))?;
        attributes.set(id, value);
    }

    Ok((attributes, HEADER_LEN + ATTRIBUTES_MARKER.len() + bits.bytes_consumed()))
}

fn read_skills(data: &[u8], offset: usize, class: CharacterClass) -> Result<Vec<Skill>, D2sError> {
    let body = expect_marker(data, offset, SKILLS_MARKER, "skills")?;
    let points = body
        .get(..SKILL_COUNT)
        .ok_or(D2sError::SectionTruncated("skills"))?;

    Ok(points
        .iter()
        .zip(class.first_skill()..)
        .map(|(points, id)| Skill {
            id,
            points: *points,
        })
        .collect())
}

/// Returns the bytes following `marker` at `offset`.
fn expect_marker<'a>(
    data: &'a [u8],
    offset: usize,
    marker: &[u8; 2],
    section: &'static str,
) -> Result<&'a [u8], D2sError> {
    match data.get(offset..offset + marker.len()) {
        Some(found) if found == marker => Ok(&data[offset + marker.len()..]),
        _ => Err(D2sError::MissingSection(section)),
    }
}

/// Reads little-endian bit fields, least significant bit first.
struct BitReader<'a> {
    data: &'a [u8],
    position: usize,
}

impl<'a> BitReader<'a> {
    fn new(data: &'a [u8]) -> Self {
        Self { data, position: 0 }
    }

    fn read(&mut self, width: usize) -> Option<u32> {
        if self.position + width > self.data.len() * 8 {
            return None;
        }
        let mut value = 0u32;
        for bit in 0..width {
            let at = self.position + bit;
            let set = (self.data[at / 8] >> (at % 8)) & 1;
            value |= u32::from(set) << bit;
        }
        self.position += width;
        Some(value)
    }

    /// Whole bytes touched so far; a partial trailing byte counts.
    fn bytes_consumed(&self) -> usize {
        self.position.div_ceil(8)
    }
}

/// Computes the file checksum, treating the stored checksum field as zero.
pub fn checksum(data: &[u8]) -> u32 {
    let field = OFFSET_CHECKSUM..OFFSET_CHECKSUM + 4;
    data.iter().enumerate().fold(0u32, |sum, (idx, byte)| {
        let byte = if field.contains(&idx) { 0 } else { *byte };
        sum.rotate_left(1).wrapping_add(u32::from(byte))
    })
}

fn read_u32(data: &[u8], offset: usize) -> u32 {
    let mut buf = [0u8; 4];
    buf.copy_from_slice(&data[offset..offset + 4]);
    u32::from_le_bytes(buf)
}

fn read_name(raw: &[u8]) -> Result<String, D2sError> {
    let end = raw.iter().position(|b| *b == 0).unwrap_or(raw.len());
    let name = &raw[..end];
    if !name.is_ascii() {
        return Err(D2sError::InvalidName);
    }
    Ok(String::from_utf8_lossy(name).into_owned())
}
