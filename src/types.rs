// SPDX-License-Identifier: MIT

//! Standalone HID value types that exist for type safety only.
//! These are all simple wrappers around their underlying integer data type.
//!
//! Only the values that influence the decoded field layout have a type here.
//! Items the decoder accepts but does not record (Unit, Unit Exponent, the
//! Designator and String locals) have no counterpart.
//!
//! In this document and unless stated otherwise, a reference to "Section a.b.c" refers to the
//! [HID Device Class Definition for HID 1.11](https://www.usb.org/document-library/device-class-definition-hid-111).

/// Creates a `From<Foo> for u32` and `From<u32> for Foo` implementation for the given `Foo` type.
/// Use like this: `impl_from(Foo, Foo, u32)`.
macro_rules! impl_from {
    ($tipo:ty, $tipo_expr:expr, $to:ty) => {
        impl From<$tipo> for $to {
            fn from(f: $tipo) -> $to {
                f.0
            }
        }
        impl From<&$tipo> for $to {
            fn from(f: &$tipo) -> $to {
                f.0
            }
        }
        impl From<$to> for $tipo {
            fn from(f: $to) -> Self {
                $tipo_expr(f)
            }
        }
    };
}

/// Creates a `impl Display for Foo` that just converts into the underlying number.
/// Use like this: `impl_fmt(Foo, u32)`.
macro_rules! impl_fmt {
    ($tipo:ty, $to:ty) => {
        impl std::fmt::Display for $tipo {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                let v: $to = self.into();
                write!(f, "{v}")
            }
        }
    };
}

// ---------- GLOBAL ITEMS ---------------------

/// Section 6.2.2.7: the upper half of a [Usage](crate::Usage).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct UsagePage(pub u16);

impl_from!(UsagePage, UsagePage, u16);
impl_fmt!(UsagePage, u16);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LogicalMinimum(pub i32);

impl_from!(LogicalMinimum, LogicalMinimum, i32);
impl_fmt!(LogicalMinimum, i32);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LogicalMaximum(pub i32);

impl_from!(LogicalMaximum, LogicalMaximum, i32);
impl_fmt!(LogicalMaximum, i32);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PhysicalMinimum(pub i32);

impl_from!(PhysicalMinimum, PhysicalMinimum, i32);
impl_fmt!(PhysicalMinimum, i32);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PhysicalMaximum(pub i32);

impl_from!(PhysicalMaximum, PhysicalMaximum, i32);
impl_fmt!(PhysicalMaximum, i32);

/// The size of a single field in bits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReportSize(pub usize);

impl_from!(ReportSize, ReportSize, usize);
impl_fmt!(ReportSize, usize);

/// A Report ID prefixes each report on the wire. Valid values are
/// 1 through 255, Section 6.2.2.7 reserves 0.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ReportId(pub u8);

impl From<&ReportId> for ReportId {
    fn from(report_id: &ReportId) -> ReportId {
        ReportId(u8::from(report_id))
    }
}

impl_from!(ReportId, ReportId, u8);
impl_fmt!(ReportId, u8);

/// The number of fields a single Main item creates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReportCount(pub usize);

impl_from!(ReportCount, ReportCount, usize);
impl_fmt!(ReportCount, usize);

// ----------------- LOCAL ITEMS --------------------

/// The lower half of a [Usage](crate::Usage).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct UsageId(pub u16);

impl_from!(UsageId, UsageId, u16);
impl_fmt!(UsageId, u16);

/// The raw value of a Usage Minimum item. Where the item was 4 bytes
/// long, the upper 16 bits are the Usage Page.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UsageMinimum(pub u32);

impl_from!(UsageMinimum, UsageMinimum, u32);
impl_fmt!(UsageMinimum, u32);

/// The raw value of a Usage Maximum item, see [UsageMinimum].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UsageMaximum(pub u32);

impl_from!(UsageMaximum, UsageMaximum, u32);
impl_fmt!(UsageMaximum, u32);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn conversions() {
        let page = UsagePage::from(0x0cu16);
        assert_eq!(u16::from(&page), 0x0c);
        assert_eq!(format!("{page}"), "12");

        let min = LogicalMinimum(-127);
        assert_eq!(i32::from(min), -127);
        assert_eq!(format!("{min}"), "-127");

        let id = ReportId::from(&ReportId(3));
        assert_eq!(u8::from(id), 3);
    }
}
