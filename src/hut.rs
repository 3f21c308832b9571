// SPDX-License-Identifier: MIT

//! Conversions from and to the [HID Usage Tables](https://usb.org/document-library/hid-usage-tables-15)
//! as provided by the [hut](https://docs.rs/hut) crate.
//!
//! ```
//! use hidfield::*;
//! use hidfield::hid::*;
//! use hut::AsUsage;
//!
//! let bytes = ReportDescriptorBuilder::new()
//!     .usage_page(hut::UsagePage::GenericDesktop)
//!     .usage_id(hut::GenericDesktop::X.usage())
//!     .report_size(ReportSize(8))
//!     .report_count(ReportCount(1))
//!     .input(MainItemFlags::VARIABLE)
//!     .build();
//!
//! let rdesc = ReportDescriptor::parse(&bytes).unwrap();
//! let usage = rdesc.fields(Direction::Input, None)[0].usages()[0];
//! assert_eq!(usage.hut_usage(), Some(hut::GenericDesktop::X.usage()));
//! ```

use ::hut::{AsUsage, AsUsagePage};

use crate::types::{UsageId, UsagePage};
use crate::Usage;

impl From<&::hut::UsagePage> for UsagePage {
    fn from(hut: &::hut::UsagePage) -> UsagePage {
        UsagePage(hut.usage_page_value())
    }
}

impl From<::hut::UsagePage> for UsagePage {
    fn from(hut: ::hut::UsagePage) -> UsagePage {
        UsagePage::from(&hut)
    }
}

impl From<&::hut::Usage> for Usage {
    fn from(hut: &::hut::Usage) -> Usage {
        Usage::from(hut.usage_value())
    }
}

impl From<::hut::Usage> for Usage {
    fn from(hut: ::hut::Usage) -> Usage {
        Usage::from(&hut)
    }
}

impl From<&::hut::Usage> for UsageId {
    fn from(hut: &::hut::Usage) -> UsageId {
        Usage::from(hut).usage_id
    }
}

impl From<::hut::Usage> for UsageId {
    fn from(hut: ::hut::Usage) -> UsageId {
        UsageId::from(&hut)
    }
}

impl Usage {
    /// Look up this usage in the HID Usage Tables. Returns `None` for
    /// vendor-defined or otherwise unknown usages.
    pub fn hut_usage(&self) -> Option<::hut::Usage> {
        ::hut::Usage::new_from_page_and_id(self.usage_page.into(), self.usage_id.into()).ok()
    }
}
