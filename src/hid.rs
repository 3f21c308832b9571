// SPDX-License-Identifier: MIT

//! A wrapper around the HID Core items. This module handles splitting
//! a report descriptor byte stream into its individual [Token]s.
//! Interpretation of the resulting tokens is left to the caller, see
//! [ReportDescriptor](crate::ReportDescriptor) for the decoder that builds
//! the field layout from them.
//!
//! In this document and unless stated otherwise, a reference to "Section a.b.c" refers to the
//! [HID Device Class Definition for HID 1.11](https://www.usb.org/document-library/device-class-definition-hid-111).
//!
//! # Tokenizing HID Report Descriptors
//!
//! Entry point is [`ItemTokenizer::new(bytes)`](ItemTokenizer::new). The tokenizer is
//! lazy and only decodes the next item when asked for it:
//!
//! ```
//! # use hidfield::hid::*;
//! # fn parse(bytes: &[u8]) -> hidfield::Result<()> {
//! for token in ItemTokenizer::new(bytes) {
//!     let token = token?;
//!     println!("Item at offset {:02x}", token.offset());
//!     match token.item_tag() {
//!         Some(ItemTag::Main(MainTag::Output)) => println!("This is an output item"),
//!         _ => {}
//!     }
//! }
//! # Ok(())
//! # }
//! ```
//!
//! # Building HID Report Descriptors programmatically
//!
//! ```
//! # use hidfield::hid::*;
//! # use hidfield::types::*;
//! let rdesc: Vec<u8> = ReportDescriptorBuilder::new()
//!     .usage_page(UsagePage(0x01))
//!     .usage_id(UsageId(0x02))
//!     .open_collection(0x01)
//!     .logical_minimum(LogicalMinimum(-127))
//!     .logical_maximum(LogicalMaximum(127))
//!     .report_count(ReportCount(2))
//!     .report_size(ReportSize(8))
//!     .usage_id(UsageId(0x30))
//!     .usage_id(UsageId(0x31))
//!     .input(MainItemFlags::VARIABLE | MainItemFlags::RELATIVE)
//!     .close_collection()
//!     .build();
//! assert_eq!(rdesc[0..2], [0x05, 0x01]);
//! ```
//!
//! Note that the [ReportDescriptorBuilder] does **not** validate the items.

use crate::types::*;
use crate::{ParserError, Usage};

use thiserror::Error;

/// Convenience function to be extract a single bit as bool from a value
fn bit(bits: u32, bit: u8) -> bool {
    debug_assert!(bit < 32);
    bits & (1 << bit) != 0
}

/// The data bytes of a HID item, guaranteed to
/// be of length 1, 2, or 4 bytes depending on the
/// input and in LE byte order.
///
/// This struct only exists for conversion from numbers to
/// a hid-compatible byte array.
struct HidBytes(Vec<u8>);

impl HidBytes {
    fn take(self) -> Vec<u8> {
        self.0
    }
}

impl From<u32> for HidBytes {
    fn from(value: u32) -> HidBytes {
        let bytes = value.to_le_bytes();
        let cutoff = match value {
            0..=255 => 1,
            256..=0xffff => 2,
            _ => 4,
        };
        HidBytes(bytes[0..cutoff].to_vec())
    }
}

impl From<i32> for HidBytes {
    fn from(value: i32) -> HidBytes {
        const MIN16: i32 = i16::MIN as i32;
        const MAX16: i32 = i16::MAX as i32;
        let bytes = match value {
            -128..=127 => (value as i8).to_le_bytes().to_vec(),
            MIN16..=MAX16 => (value as i16).to_le_bytes().to_vec(),
            _ => value.to_le_bytes().to_vec(),
        };
        HidBytes(bytes)
    }
}

/// Represents one value extracted from a set of (LE) bytes.
#[derive(Debug, Clone, Copy)]
pub(crate) struct HidValue {
    value: u32,
    nbytes: usize,
}

impl HidValue {
    /// The length of the value in bytes, required to
    /// sign-extend the value
    pub(crate) fn len(&self) -> usize {
        self.nbytes
    }
}

impl TryFrom<&[u8]> for HidValue {
    type Error = HidError;

    fn try_from(bytes: &[u8]) -> Result<HidValue> {
        let value = match *bytes {
            [b0] => b0 as u32,
            [b0, b1] => u16::from_le_bytes([b0, b1]) as u32,
            [b0, b1, b2, b3] => u32::from_le_bytes([b0, b1, b2, b3]),
            _ => {
                return Err(HidError::InvalidData {
                    message: format!("Cannot decode a value from {} bytes", bytes.len()),
                })
            }
        };
        Ok(HidValue {
            value,
            nbytes: bytes.len(),
        })
    }
}

impl From<&HidValue> for u32 {
    fn from(v: &HidValue) -> u32 {
        v.value
    }
}

impl From<&HidValue> for i32 {
    fn from(v: &HidValue) -> i32 {
        match v.len() {
            1 => ((v.value & 0xFF) as i8) as i32,
            2 => ((v.value & 0xFFFF) as i16) as i32,
            _ => v.value as i32,
        }
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum HidError {
    #[error("Invalid data: {message}")]
    InvalidData { message: String },
    #[error("Insufficient data: item needs {needed} bytes but only {available} remain")]
    InsufficientData { needed: usize, available: usize },
}

type Result<T> = std::result::Result<T, HidError>;

/// The type of a HID item, bits 3 and 2 of the item prefix (Section 6.2.2.2).
///
/// [ItemType::Reserved] is a placeholder only, it also covers the long item
/// prefix `0xFE` (Section 6.2.2.3) which is not used in the wild.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ItemType {
    Main,
    Global,
    Local,
    Reserved,
}

impl ItemType {
    /// The two-bit value of this type as used in the item prefix.
    pub fn bits(&self) -> u8 {
        match self {
            ItemType::Main => 0,
            ItemType::Global => 1,
            ItemType::Local => 2,
            ItemType::Reserved => 3,
        }
    }
}

impl From<u8> for ItemType {
    /// Extracts the item type from an item prefix byte.
    fn from(prefix: u8) -> ItemType {
        match (prefix & 0b1100) >> 2 {
            0 => ItemType::Main,
            1 => ItemType::Global,
            2 => ItemType::Local,
            _ => ItemType::Reserved,
        }
    }
}

impl std::fmt::Display for ItemType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            ItemType::Main => "Main",
            ItemType::Global => "Global",
            ItemType::Local => "Local",
            ItemType::Reserved => "Reserved",
        };
        write!(f, "{name}")
    }
}

/// Main item tags, see Section 6.2.2.4
///
/// > Main items are used to either define or group certain types of data fields within a
/// > Report descriptor. There are two types of Main items: data and non-data. Data-
/// > type Main items are used to create a field within a report and include Input,
/// > Output, and Feature. Other items do not create fields and are subsequently
/// > referred to as non-data Main items.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MainTag {
    Input,
    Output,
    Feature,
    Collection,
    EndCollection,
}

impl MainTag {
    pub fn value(&self) -> u8 {
        match self {
            MainTag::Input => 0b1000,
            MainTag::Output => 0b1001,
            MainTag::Collection => 0b1010,
            MainTag::Feature => 0b1011,
            MainTag::EndCollection => 0b1100,
        }
    }
}

impl TryFrom<u8> for MainTag {
    type Error = u8;

    fn try_from(tag: u8) -> std::result::Result<MainTag, u8> {
        match tag {
            0b1000 => Ok(MainTag::Input),
            0b1001 => Ok(MainTag::Output),
            0b1010 => Ok(MainTag::Collection),
            0b1011 => Ok(MainTag::Feature),
            0b1100 => Ok(MainTag::EndCollection),
            n => Err(n),
        }
    }
}

/// Global item tags, see Section 6.2.2.7.
///
/// > Global items describe rather than define data from a control. A new Main item
/// > assumes the characteristics of the item state table. Global items can change the
/// > state table. As a result Global item tags apply to all subsequently defined items
/// > unless overridden by another Global item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GlobalTag {
    UsagePage,
    LogicalMinimum,
    LogicalMaximum,
    PhysicalMinimum,
    PhysicalMaximum,
    UnitExponent,
    Unit,
    ReportSize,
    ReportId,
    ReportCount,
    Push,
    Pop,
}

impl GlobalTag {
    pub fn value(&self) -> u8 {
        match self {
            GlobalTag::UsagePage => 0b0000,
            GlobalTag::LogicalMinimum => 0b0001,
            GlobalTag::LogicalMaximum => 0b0010,
            GlobalTag::PhysicalMinimum => 0b0011,
            GlobalTag::PhysicalMaximum => 0b0100,
            GlobalTag::UnitExponent => 0b0101,
            GlobalTag::Unit => 0b0110,
            GlobalTag::ReportSize => 0b0111,
            GlobalTag::ReportId => 0b1000,
            GlobalTag::ReportCount => 0b1001,
            GlobalTag::Push => 0b1010,
            GlobalTag::Pop => 0b1011,
        }
    }

    /// True if the payload of this item is a two's complement integer.
    pub fn is_signed(&self) -> bool {
        matches!(
            self,
            GlobalTag::LogicalMinimum
                | GlobalTag::LogicalMaximum
                | GlobalTag::PhysicalMinimum
                | GlobalTag::PhysicalMaximum
                | GlobalTag::UnitExponent
        )
    }
}

impl TryFrom<u8> for GlobalTag {
    type Error = u8;

    fn try_from(tag: u8) -> std::result::Result<GlobalTag, u8> {
        match tag {
            0b0000 => Ok(GlobalTag::UsagePage),
            0b0001 => Ok(GlobalTag::LogicalMinimum),
            0b0010 => Ok(GlobalTag::LogicalMaximum),
            0b0011 => Ok(GlobalTag::PhysicalMinimum),
            0b0100 => Ok(GlobalTag::PhysicalMaximum),
            0b0101 => Ok(GlobalTag::UnitExponent),
            0b0110 => Ok(GlobalTag::Unit),
            0b0111 => Ok(GlobalTag::ReportSize),
            0b1000 => Ok(GlobalTag::ReportId),
            0b1001 => Ok(GlobalTag::ReportCount),
            0b1010 => Ok(GlobalTag::Push),
            0b1011 => Ok(GlobalTag::Pop),
            n => Err(n),
        }
    }
}

/// Local item tags, see Section 6.2.2.8.
///
/// > Local item tags define characteristics of controls. These items do not carry over to
/// > the next Main item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LocalTag {
    Usage,
    UsageMinimum,
    UsageMaximum,
    DesignatorIndex,
    DesignatorMinimum,
    DesignatorMaximum,
    StringIndex,
    StringMinimum,
    StringMaximum,
    Delimiter,
}

impl LocalTag {
    pub fn value(&self) -> u8 {
        match self {
            LocalTag::Usage => 0b0000,
            LocalTag::UsageMinimum => 0b0001,
            LocalTag::UsageMaximum => 0b0010,
            LocalTag::DesignatorIndex => 0b0011,
            LocalTag::DesignatorMinimum => 0b0100,
            LocalTag::DesignatorMaximum => 0b0101,
            LocalTag::StringIndex => 0b0111,
            LocalTag::StringMinimum => 0b1000,
            LocalTag::StringMaximum => 0b1001,
            LocalTag::Delimiter => 0b1010,
        }
    }
}

impl TryFrom<u8> for LocalTag {
    type Error = u8;

    fn try_from(tag: u8) -> std::result::Result<LocalTag, u8> {
        match tag {
            0b0000 => Ok(LocalTag::Usage),
            0b0001 => Ok(LocalTag::UsageMinimum),
            0b0010 => Ok(LocalTag::UsageMaximum),
            0b0011 => Ok(LocalTag::DesignatorIndex),
            0b0100 => Ok(LocalTag::DesignatorMinimum),
            0b0101 => Ok(LocalTag::DesignatorMaximum),
            // 0b0110 is reserved between Designator Maximum and String Index
            0b0111 => Ok(LocalTag::StringIndex),
            0b1000 => Ok(LocalTag::StringMinimum),
            0b1001 => Ok(LocalTag::StringMaximum),
            0b1010 => Ok(LocalTag::Delimiter),
            n => Err(n),
        }
    }
}

/// A known `(item type, tag)` combination.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ItemTag {
    Main(MainTag),
    Global(GlobalTag),
    Local(LocalTag),
}

impl ItemTag {
    /// Resolve the tag for the given item type. Returns `None` for
    /// tags outside the known set and for [ItemType::Reserved].
    pub fn resolve(item_type: ItemType, tag: u8) -> Option<ItemTag> {
        match item_type {
            ItemType::Main => MainTag::try_from(tag).ok().map(ItemTag::Main),
            ItemType::Global => GlobalTag::try_from(tag).ok().map(ItemTag::Global),
            ItemType::Local => LocalTag::try_from(tag).ok().map(ItemTag::Local),
            ItemType::Reserved => None,
        }
    }

    pub fn item_type(&self) -> ItemType {
        match self {
            ItemTag::Main(_) => ItemType::Main,
            ItemTag::Global(_) => ItemType::Global,
            ItemTag::Local(_) => ItemType::Local,
        }
    }

    /// The shifted-down tag in the range 0..15
    pub fn tag(&self) -> u8 {
        match self {
            ItemTag::Main(t) => t.value(),
            ItemTag::Global(t) => t.value(),
            ItemTag::Local(t) => t.value(),
        }
    }

    /// The prefix byte for this tag without the size bits.
    pub fn prefix(&self) -> u8 {
        (self.tag() << 4) | (self.item_type().bits() << 2)
    }

    fn is_signed(&self) -> bool {
        matches!(self, ItemTag::Global(g) if g.is_signed())
    }
}

impl From<MainTag> for ItemTag {
    fn from(tag: MainTag) -> ItemTag {
        ItemTag::Main(tag)
    }
}

impl From<GlobalTag> for ItemTag {
    fn from(tag: GlobalTag) -> ItemTag {
        ItemTag::Global(tag)
    }
}

impl From<LocalTag> for ItemTag {
    fn from(tag: LocalTag) -> ItemTag {
        ItemTag::Local(tag)
    }
}

/// A single short item decoded from a report descriptor (Section 6.2.2.2).
///
/// The data payload is little-endian. It is sign-extended for the signed
/// global items (see [GlobalTag::is_signed]) and zero-extended otherwise.
/// Main items without payload have a data value of `0`, Global and Local
/// items without payload have no data at all.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Token {
    offset: usize,
    item_type: ItemType,
    tag: u8,
    size: usize,
    data: Option<i64>,
}

impl Token {
    /// The byte offset of this item's prefix in the report descriptor.
    pub fn offset(&self) -> usize {
        self.offset
    }

    pub fn item_type(&self) -> ItemType {
        self.item_type
    }

    /// The tag as shifted-down numeric value in the range 0..15.
    pub fn tag(&self) -> u8 {
        self.tag
    }

    /// The number of payload bytes, one of 0, 1, 2 or 4.
    pub fn size(&self) -> usize {
        self.size
    }

    pub fn data(&self) -> Option<i64> {
        self.data
    }

    /// The payload reinterpreted as its unsigned 32 bit pattern.
    pub fn data_u32(&self) -> Option<u32> {
        self.data.map(|d| d as u32)
    }

    /// The known tag for this item, if any.
    pub fn item_tag(&self) -> Option<ItemTag> {
        ItemTag::resolve(self.item_type, self.tag)
    }
}

/// The payload byte count for the two size bits of an item prefix.
fn payload_size(size_code: u8) -> Result<usize> {
    match size_code {
        0 => Ok(0),
        1 => Ok(1),
        2 => Ok(2),
        3 => Ok(4),
        n => Err(HidError::InvalidData {
            message: format!("Invalid item size code {n}"),
        }),
    }
}

fn decode_token(bytes: &[u8], offset: usize) -> Result<Token> {
    let prefix = *bytes.first().ok_or(HidError::InsufficientData {
        needed: 1,
        available: 0,
    })?;
    let tag = (prefix & 0b11110000) >> 4;
    let item_type = ItemType::from(prefix);
    let size = payload_size(prefix & 0b0011)?;
    ensure!(
        bytes.len() > size,
        HidError::InsufficientData {
            needed: size + 1,
            available: bytes.len(),
        }
    );

    let data = if size == 0 {
        match item_type {
            ItemType::Main => Some(0),
            _ => None,
        }
    } else {
        let value = HidValue::try_from(&bytes[1..=size])?;
        let signed = ItemTag::resolve(item_type, tag).is_some_and(|t| t.is_signed());
        if signed {
            Some(i64::from(i32::from(&value)))
        } else {
            Some(i64::from(u32::from(&value)))
        }
    };

    Ok(Token {
        offset,
        item_type,
        tag,
        size,
        data,
    })
}

/// Lazily splits a report descriptor into its [Token]s.
///
/// Each call to [Iterator::next] decodes exactly one item. A truncated item
/// yields a [ParserError::MalformedItem] and ends the iteration, the
/// tokenizer cannot be rewound.
#[derive(Debug, Clone)]
pub struct ItemTokenizer<'a> {
    bytes: &'a [u8],
    offset: usize,
}

impl<'a> ItemTokenizer<'a> {
    pub fn new(bytes: &'a [u8]) -> Self {
        ItemTokenizer { bytes, offset: 0 }
    }

    /// The byte offset of the next item to be decoded.
    pub fn offset(&self) -> usize {
        self.offset
    }
}

impl Iterator for ItemTokenizer<'_> {
    type Item = crate::Result<Token>;

    fn next(&mut self) -> Option<Self::Item> {
        let offset = self.offset;
        let remaining = self.bytes.get(offset..).filter(|b| !b.is_empty())?;
        match decode_token(remaining, offset) {
            Ok(token) => {
                self.offset += 1 + token.size;
                Some(Ok(token))
            }
            Err(e) => {
                self.offset = self.bytes.len();
                Some(Err(ParserError::MalformedItem {
                    offset,
                    message: format!("{e}"),
                }))
            }
        }
    }
}

impl std::iter::FusedIterator for ItemTokenizer<'_> {}

/// The flags of a Main Data Item (Input, Output, Feature), see Section 6.2.2.5.
///
/// These properties come in pairs (bit set or unset in the HID report descriptor item),
/// for readability in the caller, a function is provided for each state.
pub trait MainDataItem {
    /// True if the data is constant and never changes.
    fn is_constant(&self) -> bool;

    fn is_data(&self) -> bool {
        !self.is_constant()
    }

    /// True if each field reports one independent value. Otherwise
    /// the field is an array of indices into its usage list.
    fn is_variable(&self) -> bool;

    fn is_array(&self) -> bool {
        !self.is_variable()
    }

    /// True if the data is relative compared to a previous report
    fn is_relative(&self) -> bool;

    fn is_absolute(&self) -> bool {
        !self.is_relative()
    }

    /// True if the data wraps around at the logical
    /// minimum/maximum (e.g. a dial that can spin at 360 degrees).
    fn wraps(&self) -> bool;

    fn does_not_wrap(&self) -> bool {
        !self.wraps()
    }

    /// True if the data was pre-processed on the device
    /// and the logical range is not linear.
    fn is_nonlinear(&self) -> bool;

    fn is_linear(&self) -> bool {
        !self.is_nonlinear()
    }

    /// True if the control does not return to a preferred state
    /// when the user stops interacting.
    fn has_no_preferred_state(&self) -> bool;

    fn has_preferred_state(&self) -> bool {
        !self.has_no_preferred_state()
    }

    /// True if the control has a state in which it does not send
    /// meaningful data.
    fn has_null_state(&self) -> bool;

    fn has_no_null_state(&self) -> bool {
        !self.has_null_state()
    }

    /// True if the value may change without host interaction. Only
    /// meaningful for Output and Feature items, the bit is reserved for Input.
    fn is_volatile(&self) -> bool;

    fn is_non_volatile(&self) -> bool {
        !self.is_volatile()
    }

    /// True if the control emits a fixed size stream of bytes.
    fn is_buffered_bytes(&self) -> bool;

    fn is_bitfield(&self) -> bool {
        !self.is_buffered_bytes()
    }
}

/// The raw data value of an Input, Output or Feature item.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct MainItemFlags(pub u32);

impl MainItemFlags {
    pub const CONSTANT: MainItemFlags = MainItemFlags(1 << 0);
    pub const VARIABLE: MainItemFlags = MainItemFlags(1 << 1);
    pub const RELATIVE: MainItemFlags = MainItemFlags(1 << 2);
    pub const WRAP: MainItemFlags = MainItemFlags(1 << 3);
    pub const NONLINEAR: MainItemFlags = MainItemFlags(1 << 4);
    pub const NO_PREFERRED_STATE: MainItemFlags = MainItemFlags(1 << 5);
    pub const NULL_STATE: MainItemFlags = MainItemFlags(1 << 6);
    pub const VOLATILE: MainItemFlags = MainItemFlags(1 << 7);
    pub const BUFFERED_BYTES: MainItemFlags = MainItemFlags(1 << 8);

    pub fn bits(&self) -> u32 {
        self.0
    }
}

impl std::ops::BitOr for MainItemFlags {
    type Output = MainItemFlags;

    fn bitor(self, rhs: MainItemFlags) -> MainItemFlags {
        MainItemFlags(self.0 | rhs.0)
    }
}

impl From<u32> for MainItemFlags {
    fn from(bits: u32) -> MainItemFlags {
        MainItemFlags(bits)
    }
}

impl MainDataItem for MainItemFlags {
    fn is_constant(&self) -> bool {
        bit(self.0, 0)
    }

    fn is_variable(&self) -> bool {
        bit(self.0, 1)
    }

    fn is_relative(&self) -> bool {
        bit(self.0, 2)
    }

    fn wraps(&self) -> bool {
        bit(self.0, 3)
    }

    fn is_nonlinear(&self) -> bool {
        bit(self.0, 4)
    }

    fn has_no_preferred_state(&self) -> bool {
        bit(self.0, 5)
    }

    fn has_null_state(&self) -> bool {
        bit(self.0, 6)
    }

    fn is_volatile(&self) -> bool {
        bit(self.0, 7)
    }

    fn is_buffered_bytes(&self) -> bool {
        bit(self.0, 8)
    }
}

/// Builds a HID report descriptor from scratch, one short item at a time.
///
/// Numeric payloads use the smallest of 1, 2 or 4 bytes that can represent
/// the value. The builder does **not** check that the result is a valid
/// (or even decodable) report descriptor.
#[derive(Debug, Clone, Default)]
pub struct ReportDescriptorBuilder {
    bytes: Vec<u8>,
}

impl ReportDescriptorBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an item with the given little-endian payload bytes. A 3-byte
    /// payload is zero-extended to 4 bytes. Short items carry at most
    /// 4 bytes, any bytes beyond that are discarded.
    pub fn item(mut self, tag: impl Into<ItemTag>, data: &[u8]) -> Self {
        debug_assert!(data.len() <= 4, "short item payload of {} bytes", data.len());
        let data = &data[..data.len().min(4)];
        let (len, padding) = match data.len() {
            0 => (0b00, 0),
            1 => (0b01, 0),
            2 => (0b10, 0),
            3 => (0b11, 1),
            _ => (0b11, 0),
        };
        self.bytes.push(tag.into().prefix() | len);
        self.bytes.extend_from_slice(data);
        self.bytes.extend(std::iter::repeat(0).take(padding));
        self
    }

    fn unsigned(self, tag: impl Into<ItemTag>, value: u32) -> Self {
        let data = HidBytes::from(value).take();
        self.item(tag, &data)
    }

    fn signed(self, tag: impl Into<ItemTag>, value: i32) -> Self {
        let data = HidBytes::from(value).take();
        self.item(tag, &data)
    }

    /// Append raw bytes, e.g. to produce deliberately broken descriptors.
    pub fn raw(mut self, bytes: &[u8]) -> Self {
        self.bytes.extend_from_slice(bytes);
        self
    }

    pub fn usage_page(self, usage_page: impl Into<UsagePage>) -> Self {
        let page: u16 = usage_page.into().into();
        self.unsigned(GlobalTag::UsagePage, page as u32)
    }

    /// Append a Usage with only the Usage ID, the page comes from the
    /// current Usage Page.
    pub fn usage_id(self, usage_id: impl Into<UsageId>) -> Self {
        let id: u16 = usage_id.into().into();
        self.unsigned(LocalTag::Usage, id as u32)
    }

    /// Append a 4-byte Usage that carries its own Usage Page.
    pub fn usage(self, usage: impl Into<Usage>) -> Self {
        let usage: Usage = usage.into();
        self.item(LocalTag::Usage, &u32::from(&usage).to_le_bytes())
    }

    pub fn usage_minimum(self, minimum: impl Into<UsageMinimum>) -> Self {
        self.unsigned(LocalTag::UsageMinimum, minimum.into().into())
    }

    pub fn usage_maximum(self, maximum: impl Into<UsageMaximum>) -> Self {
        self.unsigned(LocalTag::UsageMaximum, maximum.into().into())
    }

    pub fn logical_minimum(self, minimum: impl Into<LogicalMinimum>) -> Self {
        self.signed(GlobalTag::LogicalMinimum, minimum.into().into())
    }

    pub fn logical_maximum(self, maximum: impl Into<LogicalMaximum>) -> Self {
        self.signed(GlobalTag::LogicalMaximum, maximum.into().into())
    }

    pub fn physical_minimum(self, minimum: impl Into<PhysicalMinimum>) -> Self {
        self.signed(GlobalTag::PhysicalMinimum, minimum.into().into())
    }

    pub fn physical_maximum(self, maximum: impl Into<PhysicalMaximum>) -> Self {
        self.signed(GlobalTag::PhysicalMaximum, maximum.into().into())
    }

    pub fn report_size(self, size: impl Into<ReportSize>) -> Self {
        let size: usize = size.into().into();
        self.unsigned(GlobalTag::ReportSize, size as u32)
    }

    pub fn report_count(self, count: impl Into<ReportCount>) -> Self {
        let count: usize = count.into().into();
        self.unsigned(GlobalTag::ReportCount, count as u32)
    }

    pub fn report_id(self, id: impl Into<ReportId>) -> Self {
        let id: u8 = id.into().into();
        self.item(GlobalTag::ReportId, &[id])
    }

    pub fn push(self) -> Self {
        self.item(GlobalTag::Push, &[])
    }

    pub fn pop(self) -> Self {
        self.item(GlobalTag::Pop, &[])
    }

    /// Open a collection of the given type (Physical = 0, Application = 1, ...).
    pub fn open_collection(self, collection_type: u8) -> Self {
        self.item(MainTag::Collection, &[collection_type])
    }

    pub fn close_collection(self) -> Self {
        self.item(MainTag::EndCollection, &[])
    }

    pub fn input(self, flags: MainItemFlags) -> Self {
        self.main_data(MainTag::Input, flags)
    }

    pub fn output(self, flags: MainItemFlags) -> Self {
        self.main_data(MainTag::Output, flags)
    }

    pub fn feature(self, flags: MainItemFlags) -> Self {
        self.main_data(MainTag::Feature, flags)
    }

    fn main_data(self, tag: MainTag, flags: MainItemFlags) -> Self {
        // Flags beyond bit 7 need the 2-byte form
        let data = match flags.bits() {
            0..=0xff => vec![flags.bits() as u8],
            bits => HidBytes::from(bits).take(),
        };
        self.item(tag, &data)
    }

    pub fn build(self) -> Vec<u8> {
        self.bytes
    }
}
