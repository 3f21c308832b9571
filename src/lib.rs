// SPDX-License-Identifier: MIT

//! Decodes a HID Report Descriptor into the bit layout of every field in every
//! Input, Output and Feature report the device may send or receive.
//!
//! In this document and unless stated otherwise, a reference to "Section a.b.c" refers to the
//! [HID Device Class Definition for HID 1.11](https://www.usb.org/document-library/device-class-definition-hid-111).
//!
//! ```
//! use hidfield::*;
//!
//! #[rustfmt::skip]
//! let bytes = [
//!     0x05, 0x01,        // Usage Page (Generic Desktop)
//!     0x09, 0x02,        // Usage (Mouse)
//!     0xa1, 0x01,        // Collection (Application)
//!     0x05, 0x09,        //   Usage Page (Button)
//!     0x19, 0x01,        //   Usage Minimum (1)
//!     0x29, 0x03,        //   Usage Maximum (3)
//!     0x15, 0x00,        //   Logical Minimum (0)
//!     0x25, 0x01,        //   Logical Maximum (1)
//!     0x75, 0x01,        //   Report Size (1)
//!     0x95, 0x03,        //   Report Count (3)
//!     0x81, 0x02,        //   Input (Data,Var,Abs)
//!     0x75, 0x05,        //   Report Size (5)
//!     0x95, 0x01,        //   Report Count (1)
//!     0x81, 0x01,        //   Input (Cnst,Arr,Abs)
//!     0xc0,              // End Collection
//! ];
//!
//! let rdesc = ReportDescriptor::try_from(bytes.as_slice()).unwrap();
//! let fields = rdesc.fields(Direction::Input, None);
//! assert_eq!(fields.len(), 4);
//! assert!(matches!(fields[2], Field::Variable(_)));
//! assert_eq!(fields[2].bits(), 2..3);
//! assert!(matches!(fields[3], Field::Padding(_)));
//! assert_eq!(fields[3].bits(), 3..8);
//! ```
//!
//! Decoding is a single pass over the bytes and keeps no state beyond the
//! call, independent descriptors may be decoded on independent threads.

use std::collections::HashMap;
use std::ops::Range;
use thiserror::Error;
use tracing::{debug, trace};

/// Return early with the given error if the condition is false.
macro_rules! ensure {
    ($cond:expr, $err:expr) => {
        if !$cond {
            return Err($err);
        }
    };
}

pub mod hid;
#[cfg(feature = "hut")]
mod hut;
pub mod types;

use hid::*;
pub use types::*;

/// The default for [Limits::max_report_size], in bits.
pub const DEFAULT_MAX_REPORT_SIZE: usize = 256;
/// The default for [Limits::max_report_count].
pub const DEFAULT_MAX_REPORT_COUNT: usize = 12288;
/// The default for [Limits::max_report_bits], 16KiB in bits.
pub const DEFAULT_MAX_REPORT_BITS: usize = 16384 * 8;
/// The default for [Limits::max_usages].
pub const DEFAULT_MAX_USAGES: usize = 12288;

/// Upper bounds applied while decoding. Anything beyond these is rejected with
/// [ParserError::LimitExceeded] before any field is created.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Limits {
    /// The largest Report Size accepted, in bits
    pub max_report_size: usize,
    /// The largest Report Count accepted
    pub max_report_count: usize,
    /// The largest size of a single report (excluding the Report ID byte), in bits
    pub max_report_bits: usize,
    /// The largest number of usages collected for a single Main item
    pub max_usages: usize,
}

impl Default for Limits {
    fn default() -> Self {
        Self {
            max_report_size: DEFAULT_MAX_REPORT_SIZE,
            max_report_count: DEFAULT_MAX_REPORT_COUNT,
            max_report_bits: DEFAULT_MAX_REPORT_BITS,
            max_usages: DEFAULT_MAX_USAGES,
        }
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ParserError {
    #[error("Malformed item at offset {offset}: {message}")]
    MalformedItem { offset: usize, message: String },
    #[error("Unsupported {feature} item at offset {offset}")]
    UnsupportedFeature { offset: usize, feature: String },
    #[error("Unrecognized {item_type} item tag {tag:#06b} at offset {offset}")]
    UnrecognizedTag {
        offset: usize,
        item_type: ItemType,
        tag: u8,
    },
    #[error("Invalid item sequence at offset {offset}: {message}")]
    InvalidSequence { offset: usize, message: String },
    #[error("Limit exceeded at offset {offset}: {message}")]
    LimitExceeded { offset: usize, message: String },
}

impl ParserError {
    /// The byte offset of the item that caused this error.
    pub fn offset(&self) -> usize {
        match self {
            ParserError::MalformedItem { offset, .. }
            | ParserError::UnsupportedFeature { offset, .. }
            | ParserError::UnrecognizedTag { offset, .. }
            | ParserError::InvalidSequence { offset, .. }
            | ParserError::LimitExceeded { offset, .. } => *offset,
        }
    }
}

pub type Result<T> = std::result::Result<T, ParserError>;

fn invalid(offset: usize, message: impl Into<String>) -> ParserError {
    ParserError::InvalidSequence {
        offset,
        message: message.into(),
    }
}

fn unsupported(offset: usize, feature: &str) -> ParserError {
    ParserError::UnsupportedFeature {
        offset,
        feature: feature.into(),
    }
}

/// The report type a field belongs to.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum Direction {
    Input,
    Output,
    Feature,
}

impl Direction {
    pub const ALL: [Direction; 3] = [Direction::Input, Direction::Output, Direction::Feature];
}

/// A HID Usage, the semantic meaning of a field.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Usage {
    pub usage_page: UsagePage,
    pub usage_id: UsageId,
}

impl Usage {
    pub fn from_page_and_id(usage_page: UsagePage, usage_id: UsageId) -> Usage {
        Usage {
            usage_page,
            usage_id,
        }
    }
}

impl From<&Usage> for u32 {
    /// The 32-bit extended usage, Usage Page in the upper 16 bits.
    fn from(usage: &Usage) -> u32 {
        (u16::from(usage.usage_page) as u32) << 16 | u16::from(usage.usage_id) as u32
    }
}

impl From<u32> for Usage {
    fn from(extended: u32) -> Usage {
        Usage {
            usage_page: UsagePage((extended >> 16) as u16),
            usage_id: UsageId((extended & 0xffff) as u16),
        }
    }
}

/// The logical and physical extents in effect when a field was created.
/// These are stored as found in the descriptor and not validated against
/// the field's size.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Bounds {
    pub logical_minimum: Option<LogicalMinimum>,
    pub logical_maximum: Option<LogicalMaximum>,
    pub physical_minimum: Option<PhysicalMinimum>,
    pub physical_maximum: Option<PhysicalMaximum>,
}

/// Reserved bits without a usage. These typically come from constant
/// items and only exist to align the following fields.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PaddingField {
    pub bit_offset: usize,
    pub bit_size: usize,
    pub report_id: Option<ReportId>,
    pub direction: Direction,
}

/// A field that reports `report_count` indices into its usage list, each
/// `bit_size` bits wide. The field spans `report_count * bit_size` bits.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ArrayField {
    pub bit_offset: usize,
    pub bit_size: usize,
    pub report_count: usize,
    pub usages: Vec<Usage>,
    pub flags: MainItemFlags,
    pub bounds: Bounds,
    pub report_id: Option<ReportId>,
    pub direction: Direction,
}

/// A field that reports one independent value. `usage` is `None` where the
/// Main item declared more fields than usages.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct VariableField {
    pub bit_offset: usize,
    pub bit_size: usize,
    pub usage: Option<Usage>,
    pub flags: MainItemFlags,
    pub bounds: Bounds,
    pub report_id: Option<ReportId>,
    pub direction: Direction,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Field {
    Padding(PaddingField),
    Array(ArrayField),
    Variable(VariableField),
}

impl Field {
    /// The offset of this field in bits from the start of the report,
    /// not counting the Report ID byte.
    pub fn bit_offset(&self) -> usize {
        match self {
            Field::Padding(f) => f.bit_offset,
            Field::Array(f) => f.bit_offset,
            Field::Variable(f) => f.bit_offset,
        }
    }

    /// The width of this field in bits. For an [ArrayField] this is the
    /// width of a single index.
    pub fn bit_size(&self) -> usize {
        match self {
            Field::Padding(f) => f.bit_size,
            Field::Array(f) => f.bit_size,
            Field::Variable(f) => f.bit_size,
        }
    }

    /// All bits occupied by this field.
    pub fn bits(&self) -> Range<usize> {
        let len = match self {
            Field::Array(f) => f.bit_size * f.report_count,
            _ => self.bit_size(),
        };
        self.bit_offset()..self.bit_offset() + len
    }

    pub fn report_id(&self) -> Option<ReportId> {
        match self {
            Field::Padding(f) => f.report_id,
            Field::Array(f) => f.report_id,
            Field::Variable(f) => f.report_id,
        }
    }

    pub fn direction(&self) -> Direction {
        match self {
            Field::Padding(f) => f.direction,
            Field::Array(f) => f.direction,
            Field::Variable(f) => f.direction,
        }
    }

    /// The usages of this field, empty for padding and for a
    /// [VariableField] without usage.
    pub fn usages(&self) -> &[Usage] {
        match self {
            Field::Padding(_) => &[],
            Field::Array(f) => &f.usages,
            Field::Variable(f) => match &f.usage {
                Some(usage) => std::slice::from_ref(usage),
                None => &[],
            },
        }
    }

    /// The Main item flags this field was created with.
    pub fn flags(&self) -> Option<MainItemFlags> {
        match self {
            Field::Padding(_) => None,
            Field::Array(f) => Some(f.flags),
            Field::Variable(f) => Some(f.flags),
        }
    }
}

/// All fields of one report type with one Report ID, in wire order.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Report {
    id: Option<ReportId>,
    direction: Direction,
    fields: Vec<Field>,
}

impl Report {
    /// The report ID, if any
    pub fn report_id(&self) -> Option<ReportId> {
        self.id
    }

    pub fn direction(&self) -> Direction {
        self.direction
    }

    /// The fields present in this report
    pub fn fields(&self) -> &[Field] {
        &self.fields
    }

    /// The size of this report in bits, not counting the Report ID byte
    pub fn size_in_bits(&self) -> usize {
        self.fields.last().map(|f| f.bits().end).unwrap_or(0)
    }

    /// The size of this report on the wire in bytes, including
    /// the Report ID byte if any.
    pub fn size_in_bytes(&self) -> usize {
        let prefix = if self.id.is_some() { 1 } else { 0 };
        self.size_in_bits().div_ceil(8) + prefix
    }
}

/// The decoded report descriptor: every [Report] per [Direction] in the
/// order their first field appears in the descriptor.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ReportDescriptor {
    input_reports: Vec<Report>,
    output_reports: Vec<Report>,
    feature_reports: Vec<Report>,
}

impl ReportDescriptor {
    /// Decode the report descriptor with the [Limits::default()].
    pub fn parse(bytes: &[u8]) -> Result<ReportDescriptor> {
        parse_report_descriptor(bytes, &Limits::default())
    }

    pub fn parse_with_limits(bytes: &[u8], limits: &Limits) -> Result<ReportDescriptor> {
        parse_report_descriptor(bytes, limits)
    }

    pub fn input_reports(&self) -> &[Report] {
        &self.input_reports
    }

    pub fn output_reports(&self) -> &[Report] {
        &self.output_reports
    }

    pub fn feature_reports(&self) -> &[Report] {
        &self.feature_reports
    }

    pub fn reports(&self, direction: Direction) -> &[Report] {
        match direction {
            Direction::Input => &self.input_reports,
            Direction::Output => &self.output_reports,
            Direction::Feature => &self.feature_reports,
        }
    }

    pub fn find_report(&self, direction: Direction, report_id: Option<ReportId>) -> Option<&Report> {
        self.reports(direction).iter().find(|r| r.id == report_id)
    }

    /// The fields for the given report, empty if the descriptor has no such report.
    pub fn fields(&self, direction: Direction, report_id: Option<ReportId>) -> &[Field] {
        self.find_report(direction, report_id)
            .map(|r| r.fields())
            .unwrap_or(&[])
    }

    fn reports_mut(&mut self, direction: Direction) -> &mut Vec<Report> {
        match direction {
            Direction::Input => &mut self.input_reports,
            Direction::Output => &mut self.output_reports,
            Direction::Feature => &mut self.feature_reports,
        }
    }

    fn report_mut(&mut self, direction: Direction, report_id: Option<ReportId>) -> &mut Report {
        let reports = self.reports_mut(direction);
        let idx = match reports.iter().position(|r| r.id == report_id) {
            Some(idx) => idx,
            None => {
                reports.push(Report {
                    id: report_id,
                    direction,
                    fields: vec![],
                });
                reports.len() - 1
            }
        };
        &mut reports[idx]
    }

    fn has_fields_without_report_id(&self) -> bool {
        Direction::ALL
            .iter()
            .flat_map(|d| self.reports(*d))
            .any(|r| r.id.is_none())
    }
}

impl TryFrom<&[u8]> for ReportDescriptor {
    type Error = ParserError;

    fn try_from(bytes: &[u8]) -> Result<ReportDescriptor> {
        ReportDescriptor::parse(bytes)
    }
}

#[derive(Clone, Copy, Debug, Default)]
struct Globals {
    usage_page: Option<UsagePage>,
    logical_minimum: Option<LogicalMinimum>,
    logical_maximum: Option<LogicalMaximum>,
    physical_minimum: Option<PhysicalMinimum>,
    physical_maximum: Option<PhysicalMaximum>,
    report_size: Option<ReportSize>,
    report_id: Option<ReportId>,
    report_count: Option<ReportCount>,
}

impl Globals {
    fn bounds(&self) -> Bounds {
        Bounds {
            logical_minimum: self.logical_minimum,
            logical_maximum: self.logical_maximum,
            physical_minimum: self.physical_minimum,
            physical_maximum: self.physical_maximum,
        }
    }
}

/// A Usage, Usage Minimum or Usage Maximum as found in the item. A 4-byte
/// item carries its own Usage Page in the upper 16 bits (Section 6.2.2.8),
/// otherwise the page is the current global Usage Page.
#[derive(Clone, Copy, Debug)]
struct LocalUsage {
    usage_page: Option<UsagePage>,
    usage_id: UsageId,
}

impl LocalUsage {
    fn from_token(token: &Token) -> Option<LocalUsage> {
        let value = token.data_u32()?;
        let usage_page = match token.size() {
            4 => Some(UsagePage((value >> 16) as u16)),
            _ => None,
        };
        Some(LocalUsage {
            usage_page,
            usage_id: UsageId((value & 0xffff) as u16),
        })
    }
}

#[derive(Clone, Debug, Default)]
struct Locals {
    usages: Vec<Usage>,
    usage_minimum: Option<LocalUsage>,
}

/// The running bit offset per report.
#[derive(Debug, Default)]
struct Offsets {
    bit_offsets: HashMap<(Direction, Option<ReportId>), usize>,
}

impl Offsets {
    /// Start the offsets for a report ID at zero, unless that
    /// report ID was seen before.
    fn init_report_id(&mut self, report_id: ReportId) {
        for direction in Direction::ALL {
            self.bit_offsets
                .entry((direction, Some(report_id)))
                .or_insert(0);
        }
    }

    fn get(&self, direction: Direction, report_id: Option<ReportId>) -> usize {
        self.bit_offsets
            .get(&(direction, report_id))
            .copied()
            .unwrap_or(0)
    }

    fn set(&mut self, direction: Direction, report_id: Option<ReportId>, bit_offset: usize) {
        self.bit_offsets.insert((direction, report_id), bit_offset);
    }
}

/// The decoder state for a single report descriptor.
struct MachineState<'a> {
    limits: &'a Limits,
    globals: Globals,
    locals: Locals,
    offsets: Offsets,
    rdesc: ReportDescriptor,
}

impl<'a> MachineState<'a> {
    fn new(limits: &'a Limits) -> Self {
        MachineState {
            limits,
            globals: Globals::default(),
            locals: Locals::default(),
            offsets: Offsets::default(),
            rdesc: ReportDescriptor::default(),
        }
    }

    fn handle(&mut self, token: &Token) -> Result<()> {
        trace!(
            offset = token.offset(),
            item_type = %token.item_type(),
            tag = token.tag(),
            data = ?token.data(),
            "item"
        );
        match token.item_tag() {
            Some(ItemTag::Main(tag)) => self.handle_main(tag, token),
            Some(ItemTag::Global(tag)) => self.handle_global(tag, token),
            Some(ItemTag::Local(tag)) => self.handle_local(tag, token),
            None if token.item_type() == ItemType::Reserved => {
                Err(unsupported(token.offset(), "Reserved or Long"))
            }
            None => Err(ParserError::UnrecognizedTag {
                offset: token.offset(),
                item_type: token.item_type(),
                tag: token.tag(),
            }),
        }
    }

    fn handle_main(&mut self, tag: MainTag, token: &Token) -> Result<()> {
        match tag {
            MainTag::Collection | MainTag::EndCollection => {}
            MainTag::Input => self.emit_fields(Direction::Input, token)?,
            MainTag::Output => self.emit_fields(Direction::Output, token)?,
            MainTag::Feature => self.emit_fields(Direction::Feature, token)?,
        }
        self.locals = Locals::default();
        Ok(())
    }

    fn handle_global(&mut self, tag: GlobalTag, token: &Token) -> Result<()> {
        let offset = token.offset();
        let value = token.data_u32();
        let signed = token.data().map(|v| v as i32);
        match tag {
            GlobalTag::UsagePage => self.globals.usage_page = value.map(|v| UsagePage(v as u16)),
            GlobalTag::LogicalMinimum => self.globals.logical_minimum = signed.map(LogicalMinimum),
            GlobalTag::LogicalMaximum => self.globals.logical_maximum = signed.map(LogicalMaximum),
            GlobalTag::PhysicalMinimum => {
                self.globals.physical_minimum = signed.map(PhysicalMinimum)
            }
            GlobalTag::PhysicalMaximum => {
                self.globals.physical_maximum = signed.map(PhysicalMaximum)
            }
            GlobalTag::ReportSize => {
                self.globals.report_size = value.map(|v| ReportSize(v as usize))
            }
            GlobalTag::ReportCount => {
                self.globals.report_count = value.map(|v| ReportCount(v as usize))
            }
            GlobalTag::ReportId => {
                let report_id = match value {
                    Some(v @ 1..=255) => ReportId(v as u8),
                    Some(v) => return Err(invalid(offset, format!("Report ID {v} out of range"))),
                    None => return Err(invalid(offset, "Report ID without value")),
                };
                ensure!(
                    self.globals.report_id.is_some() || !self.rdesc.has_fields_without_report_id(),
                    invalid(
                        offset,
                        "Report ID after fields were declared without Report ID"
                    )
                );
                self.globals.report_id = Some(report_id);
                self.offsets.init_report_id(report_id);
            }
            GlobalTag::Unit | GlobalTag::UnitExponent => {
                debug!(offset, ?tag, "ignoring global item");
            }
            GlobalTag::Push => return Err(unsupported(offset, "Push")),
            GlobalTag::Pop => return Err(unsupported(offset, "Pop")),
        }
        Ok(())
    }

    fn handle_local(&mut self, tag: LocalTag, token: &Token) -> Result<()> {
        let offset = token.offset();
        match tag {
            LocalTag::Usage => {
                let local = LocalUsage::from_token(token)
                    .ok_or_else(|| invalid(offset, "Usage without value"))?;
                let usage_page = local
                    .usage_page
                    .or(self.globals.usage_page)
                    .ok_or_else(|| invalid(offset, "Usage before Usage Page"))?;
                self.ensure_usage_capacity(offset, 1)?;
                self.locals
                    .usages
                    .push(Usage::from_page_and_id(usage_page, local.usage_id));
            }
            LocalTag::UsageMinimum => {
                self.locals.usage_minimum = LocalUsage::from_token(token);
            }
            LocalTag::UsageMaximum => {
                let minimum = self
                    .locals
                    .usage_minimum
                    .take()
                    .ok_or_else(|| invalid(offset, "Usage Maximum without Usage Minimum"))?;
                let maximum = LocalUsage::from_token(token)
                    .ok_or_else(|| invalid(offset, "Usage Maximum without value"))?;
                if let (Some(min_page), Some(max_page)) = (minimum.usage_page, maximum.usage_page) {
                    ensure!(
                        min_page == max_page,
                        invalid(
                            offset,
                            format!("Usage range spans Usage Pages {min_page} and {max_page}")
                        )
                    );
                }
                let usage_page = maximum
                    .usage_page
                    .or(minimum.usage_page)
                    .or(self.globals.usage_page)
                    .ok_or_else(|| invalid(offset, "Usage range before Usage Page"))?;
                let (min, max) = (u16::from(minimum.usage_id), u16::from(maximum.usage_id));
                ensure!(
                    min <= max,
                    invalid(
                        offset,
                        format!("Usage Maximum {max} below Usage Minimum {min}")
                    )
                );
                self.ensure_usage_capacity(offset, usize::from(max - min) + 1)?;
                self.locals.usages.extend(
                    (min..=max).map(|id| Usage::from_page_and_id(usage_page, UsageId(id))),
                );
            }
            LocalTag::DesignatorIndex
            | LocalTag::DesignatorMinimum
            | LocalTag::DesignatorMaximum
            | LocalTag::StringIndex
            | LocalTag::StringMinimum
            | LocalTag::StringMaximum => {
                debug!(offset, ?tag, "ignoring local item");
            }
            LocalTag::Delimiter => return Err(unsupported(offset, "Delimiter")),
        }
        Ok(())
    }

    fn ensure_usage_capacity(&self, offset: usize, additional: usize) -> Result<()> {
        let total = self.locals.usages.len() + additional;
        ensure!(
            total <= self.limits.max_usages,
            ParserError::LimitExceeded {
                offset,
                message: format!("{total} usages exceed {}", self.limits.max_usages),
            }
        );
        Ok(())
    }

    /// Create the fields for an Input, Output or Feature item.
    fn emit_fields(&mut self, direction: Direction, token: &Token) -> Result<()> {
        let offset = token.offset();
        let report_size: usize = self
            .globals
            .report_size
            .ok_or_else(|| invalid(offset, "Main item before Report Size"))?
            .into();
        let report_count: usize = self
            .globals
            .report_count
            .ok_or_else(|| invalid(offset, "Main item before Report Count"))?
            .into();
        ensure!(report_size > 0, invalid(offset, "Report Size of zero"));
        ensure!(
            report_size <= self.limits.max_report_size,
            ParserError::LimitExceeded {
                offset,
                message: format!(
                    "Report Size {report_size} exceeds {}",
                    self.limits.max_report_size
                ),
            }
        );
        ensure!(
            report_count <= self.limits.max_report_count,
            ParserError::LimitExceeded {
                offset,
                message: format!(
                    "Report Count {report_count} exceeds {}",
                    self.limits.max_report_count
                ),
            }
        );

        let report_id = self.globals.report_id;
        let bit_offset = self.offsets.get(direction, report_id);
        let end = report_size
            .checked_mul(report_count)
            .and_then(|nbits| nbits.checked_add(bit_offset))
            .filter(|end| *end <= self.limits.max_report_bits)
            .ok_or_else(|| ParserError::LimitExceeded {
                offset,
                message: format!("Report exceeds {} bits", self.limits.max_report_bits),
            })?;

        let flags = MainItemFlags(token.data_u32().unwrap_or(0));
        let bounds = self.globals.bounds();
        let usages = std::mem::take(&mut self.locals.usages);

        let fields: Vec<Field> = if usages.is_empty() {
            (0..report_count)
                .map(|i| {
                    Field::Padding(PaddingField {
                        bit_offset: bit_offset + i * report_size,
                        bit_size: report_size,
                        report_id,
                        direction,
                    })
                })
                .collect()
        } else if flags.is_array() {
            if report_count == 0 {
                vec![]
            } else {
                vec![Field::Array(ArrayField {
                    bit_offset,
                    bit_size: report_size,
                    report_count,
                    usages,
                    flags,
                    bounds,
                    report_id,
                    direction,
                })]
            }
        } else {
            (0..report_count)
                .map(|i| {
                    Field::Variable(VariableField {
                        bit_offset: bit_offset + i * report_size,
                        bit_size: report_size,
                        usage: usages.get(i).copied(),
                        flags,
                        bounds,
                        report_id,
                        direction,
                    })
                })
                .collect()
        };

        debug!(
            offset,
            ?direction,
            ?report_id,
            bit_offset,
            report_size,
            report_count,
            nfields = fields.len(),
            "main item"
        );

        self.offsets.set(direction, report_id, end);
        if !fields.is_empty() {
            self.rdesc
                .report_mut(direction, report_id)
                .fields
                .extend(fields);
        }

        Ok(())
    }

    fn finish(self) -> ReportDescriptor {
        self.rdesc
    }
}

fn parse_report_descriptor(bytes: &[u8], limits: &Limits) -> Result<ReportDescriptor> {
    let mut state = MachineState::new(limits);
    for token in ItemTokenizer::new(bytes) {
        state.handle(&token?)?;
    }
    Ok(state.finish())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_contiguous(rdesc: &ReportDescriptor) {
        for direction in Direction::ALL {
            for report in rdesc.reports(direction) {
                let mut expected = 0;
                for field in report.fields() {
                    assert_eq!(field.bit_offset(), expected, "gap before {field:?}");
                    expected = field.bits().end;
                }
            }
        }
    }

    #[test]
    fn buttons_and_padding() {
        let bytes = ReportDescriptorBuilder::new()
            .report_id(ReportId(1))
            .usage_page(UsagePage(0x09))
            .usage_minimum(UsageMinimum(1))
            .usage_maximum(UsageMaximum(8))
            .report_size(ReportSize(1))
            .report_count(ReportCount(8))
            .input(MainItemFlags::VARIABLE)
            .report_size(ReportSize(8))
            .report_count(ReportCount(1))
            .input(MainItemFlags::CONSTANT)
            .build();

        let rdesc = ReportDescriptor::parse(&bytes).unwrap();
        let fields = rdesc.fields(Direction::Input, Some(ReportId(1)));
        assert_eq!(fields.len(), 9);
        for (i, field) in fields[..8].iter().enumerate() {
            let Field::Variable(v) = field else {
                panic!("Expected variable field, got {field:?}");
            };
            assert_eq!(v.bit_offset, i);
            assert_eq!(v.bit_size, 1);
            assert_eq!(
                v.usage,
                Some(Usage::from_page_and_id(UsagePage(0x09), UsageId(i as u16 + 1)))
            );
        }
        let Field::Padding(p) = &fields[8] else {
            panic!("Expected padding field");
        };
        assert_eq!((p.bit_offset, p.bit_size), (8, 8));

        let report = rdesc.find_report(Direction::Input, Some(ReportId(1))).unwrap();
        assert_eq!(report.size_in_bits(), 16);
        assert_eq!(report.size_in_bytes(), 3);
        assert!(rdesc.output_reports().is_empty());
        assert!(rdesc.fields(Direction::Input, None).is_empty());
    }

    #[test]
    fn usage_range_expansion() {
        let bytes = ReportDescriptorBuilder::new()
            .usage_page(UsagePage(0x01))
            .usage_minimum(UsageMinimum(0x30))
            .usage_maximum(UsageMaximum(0x32))
            .report_count(ReportCount(3))
            .report_size(ReportSize(16))
            .input(MainItemFlags::VARIABLE)
            .build();

        let rdesc = ReportDescriptor::parse(&bytes).unwrap();
        let usages: Vec<Usage> = rdesc
            .fields(Direction::Input, None)
            .iter()
            .flat_map(|f| f.usages().to_vec())
            .collect();
        assert_eq!(
            usages,
            [0x30, 0x31, 0x32].map(|id| Usage::from_page_and_id(UsagePage(0x01), UsageId(id)))
        );
        let offsets: Vec<usize> = rdesc
            .fields(Direction::Input, None)
            .iter()
            .map(|f| f.bit_offset())
            .collect();
        assert_eq!(offsets, [0, 16, 32]);
    }

    #[test]
    fn array_field() {
        let bytes = ReportDescriptorBuilder::new()
            .usage_page(UsagePage(0x07))
            .usage_id(UsageId(0x04))
            .usage_id(UsageId(0x05))
            .report_count(ReportCount(1))
            .report_size(ReportSize(8))
            .input(MainItemFlags::default())
            .report_count(ReportCount(2))
            .usage_minimum(UsageMinimum(0))
            .usage_maximum(UsageMaximum(0xff))
            .input(MainItemFlags::default())
            .report_count(ReportCount(1))
            .usage_id(UsageId(0x06))
            .input(MainItemFlags::VARIABLE)
            .build();

        let rdesc = ReportDescriptor::parse(&bytes).unwrap();
        let fields = rdesc.fields(Direction::Input, None);
        assert_eq!(fields.len(), 3);

        let Field::Array(a) = &fields[0] else {
            panic!("Expected array field");
        };
        assert_eq!(a.usages.len(), 2);
        assert_eq!(a.report_count, 1);
        assert_eq!((a.bit_offset, a.bit_size), (0, 8));

        let Field::Array(a) = &fields[1] else {
            panic!("Expected array field");
        };
        assert_eq!(a.usages.len(), 256);
        assert_eq!(a.report_count, 2);
        assert_eq!(fields[1].bits(), 8..24);

        assert_eq!(fields[2].bit_offset(), 24);
        assert_contiguous(&rdesc);
    }

    #[test]
    fn empty_usages_are_padding() {
        for flags in [MainItemFlags::default(), MainItemFlags::VARIABLE] {
            let bytes = ReportDescriptorBuilder::new()
                .report_count(ReportCount(3))
                .report_size(ReportSize(2))
                .output(flags)
                .build();
            let rdesc = ReportDescriptor::parse(&bytes).unwrap();
            let fields = rdesc.fields(Direction::Output, None);
            assert_eq!(fields.len(), 3);
            assert!(fields.iter().all(|f| matches!(f, Field::Padding(_))));
            assert_contiguous(&rdesc);
        }
    }

    #[test]
    fn fewer_usages_than_count() {
        let bytes = ReportDescriptorBuilder::new()
            .usage_page(UsagePage(0x01))
            .usage_id(UsageId(0x30))
            .usage_id(UsageId(0x31))
            .report_count(ReportCount(4))
            .report_size(ReportSize(8))
            .input(MainItemFlags::VARIABLE)
            .build();
        let rdesc = ReportDescriptor::parse(&bytes).unwrap();
        let fields = rdesc.fields(Direction::Input, None);
        assert_eq!(fields.len(), 4);
        assert_eq!(fields[1].usages().len(), 1);
        assert!(fields[2].usages().is_empty());
        assert!(fields[3].usages().is_empty());
        assert!(matches!(fields[3], Field::Variable(VariableField { usage: None, .. })));
    }

    #[test]
    fn more_usages_than_count() {
        let bytes = ReportDescriptorBuilder::new()
            .usage_page(UsagePage(0x01))
            .usage_minimum(UsageMinimum(0x30))
            .usage_maximum(UsageMaximum(0x38))
            .report_count(ReportCount(2))
            .report_size(ReportSize(8))
            .input(MainItemFlags::VARIABLE)
            .report_count(ReportCount(1))
            .input(MainItemFlags::VARIABLE)
            .build();
        let rdesc = ReportDescriptor::parse(&bytes).unwrap();
        let fields = rdesc.fields(Direction::Input, None);
        // Unused usages do not carry over to the next Main item
        assert_eq!(fields.len(), 3);
        assert!(matches!(fields[2], Field::Padding(_)));
    }

    #[test]
    fn usage_maximum_without_minimum() {
        let bytes = ReportDescriptorBuilder::new()
            .usage_page(UsagePage(0x01))
            .usage_maximum(UsageMaximum(0x32))
            .build();
        let err = ReportDescriptor::parse(&bytes).unwrap_err();
        assert!(matches!(err, ParserError::InvalidSequence { offset: 2, .. }));

        // Usage Minimum is local and reset by the main item
        let bytes = ReportDescriptorBuilder::new()
            .usage_page(UsagePage(0x01))
            .usage_minimum(UsageMinimum(0x30))
            .open_collection(0x00)
            .usage_maximum(UsageMaximum(0x32))
            .build();
        let err = ReportDescriptor::parse(&bytes).unwrap_err();
        assert!(matches!(err, ParserError::InvalidSequence { .. }));
    }

    #[test]
    fn usage_range_reversed() {
        let bytes = ReportDescriptorBuilder::new()
            .usage_page(UsagePage(0x01))
            .usage_minimum(UsageMinimum(0x32))
            .usage_maximum(UsageMaximum(0x30))
            .build();
        assert!(matches!(
            ReportDescriptor::parse(&bytes),
            Err(ParserError::InvalidSequence { .. })
        ));
    }

    #[test]
    fn usage_before_usage_page() {
        let bytes = ReportDescriptorBuilder::new().usage_id(UsageId(0x30)).build();
        assert!(matches!(
            ReportDescriptor::parse(&bytes),
            Err(ParserError::InvalidSequence { offset: 0, .. })
        ));
    }

    #[test]
    fn extended_usages() {
        let bytes = ReportDescriptorBuilder::new()
            .usage_page(UsagePage(0x01))
            .usage(Usage::from_page_and_id(UsagePage(0x0c), UsageId(0xe9)))
            .usage_id(UsageId(0x30))
            .report_count(ReportCount(2))
            .report_size(ReportSize(1))
            .input(MainItemFlags::VARIABLE)
            .item(LocalTag::UsageMinimum, &0x0009_0001u32.to_le_bytes())
            .item(LocalTag::UsageMaximum, &[0x03])
            .report_count(ReportCount(3))
            .input(MainItemFlags::VARIABLE)
            .build();
        let rdesc = ReportDescriptor::parse(&bytes).unwrap();
        let usages: Vec<u32> = rdesc
            .fields(Direction::Input, None)
            .iter()
            .flat_map(|f| f.usages().iter().map(u32::from).collect::<Vec<_>>())
            .collect();
        assert_eq!(
            usages,
            [0x000c_00e9, 0x0001_0030, 0x0009_0001, 0x0009_0002, 0x0009_0003]
        );
    }

    #[test]
    fn extended_usage_range_across_pages() {
        let bytes = ReportDescriptorBuilder::new()
            .item(LocalTag::UsageMinimum, &0x0009_0001u32.to_le_bytes())
            .item(LocalTag::UsageMaximum, &0x0007_0003u32.to_le_bytes())
            .build();
        assert!(matches!(
            ReportDescriptor::parse(&bytes),
            Err(ParserError::InvalidSequence { .. })
        ));
    }

    #[test]
    fn push_pop_unsupported() {
        let bytes = ReportDescriptorBuilder::new()
            .usage_page(UsagePage(0x01))
            .push()
            .build();
        let err = ReportDescriptor::parse(&bytes).unwrap_err();
        assert_eq!(
            err,
            ParserError::UnsupportedFeature {
                offset: 2,
                feature: "Push".into()
            }
        );

        let bytes = ReportDescriptorBuilder::new().pop().build();
        assert!(matches!(
            ReportDescriptor::parse(&bytes),
            Err(ParserError::UnsupportedFeature { .. })
        ));
    }

    #[test]
    fn delimiter_unsupported() {
        let bytes = ReportDescriptorBuilder::new()
            .item(LocalTag::Delimiter, &[0x01])
            .build();
        assert!(matches!(
            ReportDescriptor::parse(&bytes),
            Err(ParserError::UnsupportedFeature { .. })
        ));
    }

    #[test]
    fn long_item_unsupported() {
        assert!(matches!(
            ReportDescriptor::parse(&[0xfe, 0x00, 0x10]),
            Err(ParserError::UnsupportedFeature { offset: 0, .. })
        ));
    }

    #[test]
    fn unrecognized_tags() {
        // Main tag 0b1101
        assert_eq!(
            ReportDescriptor::parse(&[0xd0]).unwrap_err(),
            ParserError::UnrecognizedTag {
                offset: 0,
                item_type: ItemType::Main,
                tag: 0b1101
            }
        );
        // Global tag 0b1100
        assert!(matches!(
            ReportDescriptor::parse(&[0x05, 0x01, 0xc5, 0x00]),
            Err(ParserError::UnrecognizedTag {
                offset: 2,
                item_type: ItemType::Global,
                tag: 0b1100
            })
        ));
        // Local tag 0b0110
        assert!(matches!(
            ReportDescriptor::parse(&[0x69, 0x00]),
            Err(ParserError::UnrecognizedTag {
                item_type: ItemType::Local,
                ..
            })
        ));
    }

    #[test]
    fn ignored_items() {
        #[rustfmt::skip]
        let bytes = [
            0x05, 0x01,       // Usage Page (Generic Desktop)
            0x09, 0x30,       // Usage (X)
            0x55, 0x0d,       // Unit Exponent (13)
            0x65, 0x13,       // Unit (Inch,EngLinear)
            0x39, 0x01,       // Designator Index (1)
            0x49, 0x01,       // Designator Minimum (1)
            0x59, 0x02,       // Designator Maximum (2)
            0x79, 0x04,       // String Index (4)
            0x89, 0x04,       // String Minimum (4)
            0x99, 0x05,       // String Maximum (5)
            0x75, 0x10,       // Report Size (16)
            0x95, 0x01,       // Report Count (1)
            0x81, 0x02,       // Input (Data,Var,Abs)
        ];
        let rdesc = ReportDescriptor::parse(&bytes).unwrap();
        assert_eq!(rdesc.fields(Direction::Input, None).len(), 1);
    }

    #[test]
    fn main_item_without_size_or_count() {
        let bytes = ReportDescriptorBuilder::new()
            .report_count(ReportCount(1))
            .input(MainItemFlags::CONSTANT)
            .build();
        assert!(matches!(
            ReportDescriptor::parse(&bytes),
            Err(ParserError::InvalidSequence { offset: 2, .. })
        ));

        let bytes = ReportDescriptorBuilder::new()
            .report_size(ReportSize(1))
            .feature(MainItemFlags::CONSTANT)
            .build();
        assert!(matches!(
            ReportDescriptor::parse(&bytes),
            Err(ParserError::InvalidSequence { offset: 2, .. })
        ));

        // A Report Size without value unsets the Report Size
        let bytes = ReportDescriptorBuilder::new()
            .report_size(ReportSize(1))
            .report_count(ReportCount(1))
            .item(GlobalTag::ReportSize, &[])
            .feature(MainItemFlags::CONSTANT)
            .build();
        assert!(matches!(
            ReportDescriptor::parse(&bytes),
            Err(ParserError::InvalidSequence { .. })
        ));
    }

    #[test]
    fn interleaved_report_ids() {
        let bytes = ReportDescriptorBuilder::new()
            .usage_page(UsagePage(0x01))
            .report_size(ReportSize(8))
            .report_count(ReportCount(2))
            .report_id(ReportId(1))
            .usage_id(UsageId(0x30))
            .usage_id(UsageId(0x31))
            .input(MainItemFlags::VARIABLE)
            .report_id(ReportId(2))
            .usage_id(UsageId(0x32))
            .input(MainItemFlags::VARIABLE)
            .output(MainItemFlags::CONSTANT)
            .report_id(ReportId(1))
            .report_count(ReportCount(1))
            .input(MainItemFlags::CONSTANT)
            .build();

        let rdesc = ReportDescriptor::parse(&bytes).unwrap();
        let offsets = |d, id| -> Vec<usize> {
            rdesc
                .fields(d, Some(ReportId(id)))
                .iter()
                .map(|f| f.bit_offset())
                .collect()
        };
        assert_eq!(offsets(Direction::Input, 1), [0, 8, 16]);
        assert_eq!(offsets(Direction::Input, 2), [0, 8]);
        assert_eq!(offsets(Direction::Output, 2), [0, 8]);
        assert!(offsets(Direction::Output, 1).is_empty());

        let ids: Vec<Option<ReportId>> = rdesc.input_reports().iter().map(|r| r.report_id()).collect();
        assert_eq!(ids, [Some(ReportId(1)), Some(ReportId(2))]);
        assert_contiguous(&rdesc);
    }

    #[test]
    fn report_id_after_fields_without_id() {
        let bytes = ReportDescriptorBuilder::new()
            .report_size(ReportSize(8))
            .report_count(ReportCount(1))
            .feature(MainItemFlags::CONSTANT)
            .report_id(ReportId(1))
            .build();
        assert!(matches!(
            ReportDescriptor::parse(&bytes),
            Err(ParserError::InvalidSequence { offset: 6, .. })
        ));
    }

    #[test]
    fn report_id_out_of_range() {
        let payloads: [&[u8]; 3] = [&[0x00], &[], &[0x00, 0x01]];
        for data in payloads {
            let bytes = ReportDescriptorBuilder::new()
                .item(GlobalTag::ReportId, data)
                .build();
            assert!(matches!(
                ReportDescriptor::parse(&bytes),
                Err(ParserError::InvalidSequence { offset: 0, .. })
            ));
        }
    }

    #[test]
    fn bounds_are_recorded() {
        let bytes = ReportDescriptorBuilder::new()
            .usage_page(UsagePage(0x01))
            .usage_id(UsageId(0x38))
            .logical_minimum(LogicalMinimum(-127))
            .logical_maximum(LogicalMaximum(127))
            .physical_minimum(PhysicalMinimum(-1000))
            .physical_maximum(PhysicalMaximum(1000))
            .report_size(ReportSize(8))
            .report_count(ReportCount(1))
            .input(MainItemFlags::VARIABLE | MainItemFlags::RELATIVE)
            .build();
        let rdesc = ReportDescriptor::parse(&bytes).unwrap();
        let Field::Variable(v) = &rdesc.fields(Direction::Input, None)[0] else {
            panic!("Expected variable field");
        };
        assert_eq!(v.bounds.logical_minimum, Some(LogicalMinimum(-127)));
        assert_eq!(v.bounds.logical_maximum, Some(LogicalMaximum(127)));
        assert_eq!(v.bounds.physical_minimum, Some(PhysicalMinimum(-1000)));
        assert_eq!(v.bounds.physical_maximum, Some(PhysicalMaximum(1000)));
        assert!(v.flags.is_relative());
    }

    #[test]
    fn limits() {
        let bytes = ReportDescriptorBuilder::new()
            .report_size(ReportSize(8))
            .report_count(ReportCount(64))
            .input(MainItemFlags::CONSTANT)
            .build();
        assert!(ReportDescriptor::parse(&bytes).is_ok());

        let limits = Limits {
            max_report_count: 32,
            ..Default::default()
        };
        assert!(matches!(
            ReportDescriptor::parse_with_limits(&bytes, &limits),
            Err(ParserError::LimitExceeded { .. })
        ));

        let limits = Limits {
            max_report_bits: 8 * 63,
            ..Default::default()
        };
        assert!(matches!(
            ReportDescriptor::parse_with_limits(&bytes, &limits),
            Err(ParserError::LimitExceeded { .. })
        ));

        let bytes = ReportDescriptorBuilder::new()
            .report_size(ReportSize(0xffff_ffff))
            .report_count(ReportCount(0xffff_ffff))
            .input(MainItemFlags::CONSTANT)
            .build();
        assert!(matches!(
            ReportDescriptor::parse(&bytes),
            Err(ParserError::LimitExceeded { .. })
        ));
    }

    #[test]
    fn usage_limit() {
        // Usage Minimum (0), Usage Maximum (0xffff), repeated
        let mut builder = ReportDescriptorBuilder::new().usage_page(UsagePage(0xff00));
        for _ in 0..4 {
            builder = builder.raw(&[0x19, 0x00, 0x2a, 0xff, 0xff]);
        }
        let bytes = builder
            .report_size(ReportSize(16))
            .report_count(ReportCount(1))
            .input(MainItemFlags::default())
            .build();
        let err = ReportDescriptor::parse(&bytes).unwrap_err();
        assert!(matches!(err, ParserError::LimitExceeded { offset: 5, .. }));

        let bytes = ReportDescriptorBuilder::new()
            .usage_page(UsagePage(0x01))
            .usage_minimum(UsageMinimum(0x01))
            .usage_maximum(UsageMaximum(0x04))
            .usage_id(UsageId(0x30))
            .report_size(ReportSize(8))
            .report_count(ReportCount(1))
            .input(MainItemFlags::default())
            .build();
        let limits = Limits {
            max_usages: 4,
            ..Default::default()
        };
        let err = ReportDescriptor::parse_with_limits(&bytes, &limits).unwrap_err();
        assert!(matches!(err, ParserError::LimitExceeded { offset: 6, .. }));

        let limits = Limits {
            max_usages: 5,
            ..Default::default()
        };
        let rdesc = ReportDescriptor::parse_with_limits(&bytes, &limits).unwrap();
        assert_eq!(rdesc.fields(Direction::Input, None)[0].usages().len(), 5);
    }

    #[test]
    fn zero_report_size() {
        let bytes = ReportDescriptorBuilder::new()
            .report_size(ReportSize(0))
            .report_count(ReportCount(2))
            .input(MainItemFlags::CONSTANT)
            .build();
        assert!(matches!(
            ReportDescriptor::parse(&bytes),
            Err(ParserError::InvalidSequence { .. })
        ));
    }

    #[test]
    fn truncated_descriptor() {
        // Usage with a 2-byte payload cut off after the first byte
        let bytes = ReportDescriptorBuilder::new()
            .usage_page(UsagePage(0x01))
            .raw(&[0x0a, 0x30])
            .build();
        let err = ReportDescriptor::parse(&bytes).unwrap_err();
        assert!(matches!(err, ParserError::MalformedItem { offset: 2, .. }));
        assert_eq!(err.offset(), 2);
    }

    #[test]
    fn empty_descriptor() {
        let rdesc = ReportDescriptor::parse(&[]).unwrap();
        assert_eq!(rdesc, ReportDescriptor::default());
    }
}
