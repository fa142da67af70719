//! core::types
//!
//! Strong types for core domain concepts.
//!
//! # Types
//!
//! - [`TenantCode`] - Validated country short code for the operating tenant
//! - [`VendorNumber`] - Externally assigned partner vendor number
//! - [`Money`] - Fixed-point currency amount in minor units
//! - [`FiscalYear`] - Calendar year used for sequences and HACT windows
//! - [`Quarter`] - Calendar quarter bucket
//! - [`UtcTimestamp`] - RFC3339 creation/update stamp
//! - Entity id newtypes ([`PartnerId`], [`AgreementId`], [`InterventionId`], ...)
//!
//! # Validation
//!
//! These types enforce validity at construction time. Invalid values
//! cannot be represented, preventing entire classes of bugs.
//!
//! # Examples
//!
//! ```
//! use pactwork::core::types::{TenantCode, VendorNumber, Money};
//!
//! let tenant = TenantCode::new("LEB").unwrap();
//! assert_eq!(tenant.as_str(), "LEB");
//!
//! let vendor = VendorNumber::new("2500212391").unwrap();
//! assert_eq!(vendor.as_str(), "2500212391");
//!
//! let amount = Money::from_major(1000);
//! assert_eq!(amount.to_string(), "1000.00");
//!
//! // Invalid constructions fail at creation time
//! assert!(TenantCode::new("leb").is_err());
//! assert!(VendorNumber::new("not-a-number").is_err());
//! ```

use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

/// Errors from type validation.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum TypeError {
    #[error("invalid tenant code: {0}")]
    InvalidTenantCode(String),

    #[error("invalid vendor number: {0}")]
    InvalidVendorNumber(String),

    #[error("invalid fiscal year: {0}")]
    InvalidFiscalYear(String),

    #[error("invalid entity id: {0}")]
    InvalidEntityId(String),

    #[error("amount overflow")]
    AmountOverflow,
}

/// A validated tenant country short code.
///
/// Tenant codes are the short country identifiers that prefix every
/// reference number (e.g. `LEB/PCA202401`). They must be 2-4 uppercase
/// ASCII letters.
///
/// # Example
///
/// ```
/// use pactwork::core::types::TenantCode;
///
/// let code = TenantCode::new("LEB").unwrap();
/// assert_eq!(code.as_str(), "LEB");
///
/// assert!(TenantCode::new("").is_err());
/// assert!(TenantCode::new("leb").is_err());
/// assert!(TenantCode::new("TOOLONG").is_err());
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct TenantCode(String);

impl TenantCode {
    /// Create a new validated tenant code.
    ///
    /// # Errors
    ///
    /// Returns `TypeError::InvalidTenantCode` if the code is not 2-4
    /// uppercase ASCII letters.
    pub fn new(code: impl Into<String>) -> Result<Self, TypeError> {
        let code = code.into();
        if code.len() < 2 || code.len() > 4 {
            return Err(TypeError::InvalidTenantCode(
                "tenant code must be 2-4 characters".into(),
            ));
        }
        if !code.chars().all(|c| c.is_ascii_uppercase()) {
            return Err(TypeError::InvalidTenantCode(
                "tenant code must be uppercase ASCII letters".into(),
            ));
        }
        Ok(Self(code))
    }

    /// Get the code as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for TenantCode {
    type Error = TypeError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        Self::new(s)
    }
}

impl From<TenantCode> for String {
    fn from(code: TenantCode) -> Self {
        code.0
    }
}

impl std::fmt::Display for TenantCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// An externally assigned partner vendor number.
///
/// Vendor numbers come from the upstream vendor master and are opaque to
/// this system beyond their shape: 1-16 ASCII digits.
///
/// # Example
///
/// ```
/// use pactwork::core::types::VendorNumber;
///
/// let vendor = VendorNumber::new("2500212391").unwrap();
/// assert_eq!(vendor.as_str(), "2500212391");
///
/// assert!(VendorNumber::new("").is_err());
/// assert!(VendorNumber::new("12ab").is_err());
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct VendorNumber(String);

impl VendorNumber {
    /// Create a new validated vendor number.
    ///
    /// # Errors
    ///
    /// Returns `TypeError::InvalidVendorNumber` if the value is empty,
    /// longer than 16 characters, or contains non-digits.
    pub fn new(number: impl Into<String>) -> Result<Self, TypeError> {
        let number = number.into();
        if number.is_empty() || number.len() > 16 {
            return Err(TypeError::InvalidVendorNumber(
                "vendor number must be 1-16 digits".into(),
            ));
        }
        if !number.chars().all(|c| c.is_ascii_digit()) {
            return Err(TypeError::InvalidVendorNumber(
                "vendor number must be numeric".into(),
            ));
        }
        Ok(Self(number))
    }

    /// Get the vendor number as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for VendorNumber {
    type Error = TypeError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        Self::new(s)
    }
}

impl From<VendorNumber> for String {
    fn from(number: VendorNumber) -> Self {
        number.0
    }
}

impl std::fmt::Display for VendorNumber {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A fixed-point currency amount in minor units (cents).
///
/// All budget arithmetic is integer arithmetic so that the derived-total
/// equalities hold exactly. Serialized as the raw minor-unit integer.
///
/// # Example
///
/// ```
/// use pactwork::core::types::Money;
///
/// let a = Money::from_major(1000);
/// let b = Money::from_minor(50);
/// assert_eq!((a + b).to_string(), "1000.50");
/// assert!(Money::zero().is_zero());
/// ```
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct Money(i64);

impl Money {
    /// The zero amount.
    pub const fn zero() -> Self {
        Self(0)
    }

    /// Create from whole currency units.
    pub const fn from_major(major: i64) -> Self {
        Self(major * 100)
    }

    /// Create from minor units (cents).
    pub const fn from_minor(minor: i64) -> Self {
        Self(minor)
    }

    /// The raw minor-unit value.
    pub fn minor_units(&self) -> i64 {
        self.0
    }

    /// Check if the amount is zero.
    pub fn is_zero(&self) -> bool {
        self.0 == 0
    }

    /// Checked addition.
    ///
    /// # Errors
    ///
    /// Returns `TypeError::AmountOverflow` on i64 overflow.
    pub fn checked_add(self, other: Self) -> Result<Self, TypeError> {
        self.0
            .checked_add(other.0)
            .map(Self)
            .ok_or(TypeError::AmountOverflow)
    }

    /// Sum an iterator of amounts, saturating on overflow.
    ///
    /// Budget inputs are bounded far below i64 range; saturation here is a
    /// backstop, not an expected path.
    pub fn sum<I: IntoIterator<Item = Money>>(amounts: I) -> Self {
        Self(
            amounts
                .into_iter()
                .fold(0i64, |acc, m| acc.saturating_add(m.0)),
        )
    }

    /// Percentage of `part` over `whole`, rounded to two decimals.
    ///
    /// Returns 0.0 when `whole` is zero.
    pub fn percentage_of(part: Money, whole: Money) -> f64 {
        if whole.0 == 0 {
            return 0.0;
        }
        let raw = (part.0 as f64) * 100.0 / (whole.0 as f64);
        (raw * 100.0).round() / 100.0
    }
}

impl std::ops::Add for Money {
    type Output = Money;

    fn add(self, rhs: Money) -> Money {
        Money(self.0.saturating_add(rhs.0))
    }
}

impl std::ops::Sub for Money {
    type Output = Money;

    fn sub(self, rhs: Money) -> Money {
        Money(self.0.saturating_sub(rhs.0))
    }
}

impl std::iter::Sum for Money {
    fn sum<I: Iterator<Item = Money>>(iter: I) -> Money {
        Money::sum(iter)
    }
}

impl std::fmt::Display for Money {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let sign = if self.0 < 0 { "-" } else { "" };
        let abs = self.0.unsigned_abs();
        write!(f, "{}{}.{:02}", sign, abs / 100, abs % 100)
    }
}

/// A calendar year used for sequence scoping and HACT windows.
///
/// # Example
///
/// ```
/// use pactwork::core::types::FiscalYear;
/// use chrono::NaiveDate;
///
/// let year = FiscalYear::new(2024).unwrap();
/// assert_eq!(year.value(), 2024);
///
/// let date = NaiveDate::from_ymd_opt(2024, 3, 1).unwrap();
/// assert_eq!(FiscalYear::of(date), year);
///
/// assert!(FiscalYear::new(1999).is_err());
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "i32", into = "i32")]
pub struct FiscalYear(i32);

impl FiscalYear {
    /// Create a validated fiscal year.
    ///
    /// # Errors
    ///
    /// Returns `TypeError::InvalidFiscalYear` outside 2000-2100.
    pub fn new(year: i32) -> Result<Self, TypeError> {
        if !(2000..=2100).contains(&year) {
            return Err(TypeError::InvalidFiscalYear(format!(
                "year {} out of range 2000-2100",
                year
            )));
        }
        Ok(Self(year))
    }

    /// The fiscal year a date falls into.
    pub fn of(date: NaiveDate) -> Self {
        // Clamp rather than fail for out-of-range history imports.
        Self(date.year().clamp(2000, 2100))
    }

    /// The raw year value.
    pub fn value(&self) -> i32 {
        self.0
    }
}

impl TryFrom<i32> for FiscalYear {
    type Error = TypeError;

    fn try_from(year: i32) -> Result<Self, Self::Error> {
        Self::new(year)
    }
}

impl From<FiscalYear> for i32 {
    fn from(year: FiscalYear) -> Self {
        year.0
    }
}

impl std::fmt::Display for FiscalYear {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A calendar quarter bucket.
///
/// Used by planned visits and the HACT visit counters.
///
/// # Example
///
/// ```
/// use pactwork::core::types::Quarter;
/// use chrono::NaiveDate;
///
/// let date = NaiveDate::from_ymd_opt(2024, 5, 20).unwrap();
/// assert_eq!(Quarter::of(date), Quarter::Q2);
/// assert_eq!(Quarter::Q2.index(), 2);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Quarter {
    Q1,
    Q2,
    Q3,
    Q4,
}

impl Quarter {
    /// All quarters in order.
    pub const ALL: [Quarter; 4] = [Quarter::Q1, Quarter::Q2, Quarter::Q3, Quarter::Q4];

    /// The quarter a date falls into.
    pub fn of(date: NaiveDate) -> Self {
        match date.month() {
            1..=3 => Quarter::Q1,
            4..=6 => Quarter::Q2,
            7..=9 => Quarter::Q3,
            _ => Quarter::Q4,
        }
    }

    /// One-based quarter index.
    pub fn index(&self) -> u8 {
        match self {
            Quarter::Q1 => 1,
            Quarter::Q2 => 2,
            Quarter::Q3 => 3,
            Quarter::Q4 => 4,
        }
    }
}

impl std::fmt::Display for Quarter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "q{}", self.index())
    }
}

/// A UTC timestamp in RFC3339 format.
///
/// # Example
///
/// ```
/// use pactwork::core::types::UtcTimestamp;
///
/// let now = UtcTimestamp::now();
/// assert!(now.to_string().contains('T'));
/// ```
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct UtcTimestamp(chrono::DateTime<chrono::Utc>);

impl UtcTimestamp {
    /// Create a timestamp for the current moment.
    pub fn now() -> Self {
        Self(chrono::Utc::now())
    }

    /// Create a timestamp from a chrono DateTime.
    pub fn from_datetime(dt: chrono::DateTime<chrono::Utc>) -> Self {
        Self(dt)
    }

    /// Get the underlying datetime.
    pub fn as_datetime(&self) -> &chrono::DateTime<chrono::Utc> {
        &self.0
    }
}

impl std::fmt::Display for UtcTimestamp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0.to_rfc3339())
    }
}

/// Define a UUID-backed entity id newtype.
///
/// Ids are serialized as their canonical hyphenated string form and
/// validated on parse.
macro_rules! entity_id {
    ($(#[$doc:meta])* $name:ident) => {
        $(#[$doc])*
        #[derive(
            Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
        )]
        #[serde(transparent)]
        pub struct $name(Uuid);

        impl $name {
            /// Generate a new unique id.
            pub fn new() -> Self {
                Self(Uuid::new_v4())
            }

            /// Parse an id from its canonical string form.
            ///
            /// # Errors
            ///
            /// Returns `TypeError::InvalidEntityId` if the string is not a
            /// valid UUID.
            pub fn parse(s: &str) -> Result<Self, TypeError> {
                Uuid::parse_str(s)
                    .map(Self)
                    .map_err(|e| TypeError::InvalidEntityId(e.to_string()))
            }

            /// The underlying UUID.
            pub fn as_uuid(&self) -> &Uuid {
                &self.0
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

entity_id!(
    /// Identifier for a partner organization.
    PartnerId
);
entity_id!(
    /// Identifier for a partner staff member.
    StaffMemberId
);
entity_id!(
    /// Identifier for an agreement.
    AgreementId
);
entity_id!(
    /// Identifier for an intervention (programme document).
    InterventionId
);
entity_id!(
    /// Identifier for an amendment.
    AmendmentId
);
entity_id!(
    /// Identifier for a result link (cp-output level).
    ResultLinkId
);
entity_id!(
    /// Identifier for a lower result.
    LowerResultId
);
entity_id!(
    /// Identifier for a workplan activity.
    ActivityId
);
entity_id!(
    /// Identifier for an activity item.
    ActivityItemId
);
entity_id!(
    /// Identifier for a supply item.
    SupplyItemId
);
entity_id!(
    /// Identifier for an applied indicator.
    IndicatorId
);
entity_id!(
    /// Identifier for a planned visit row.
    PlannedVisitId
);
entity_id!(
    /// Identifier for a reporting requirement window.
    ReportingRequirementId
);
entity_id!(
    /// Identifier for an intervention time frame (quarter).
    TimeFrameId
);
entity_id!(
    /// Identifier for a system user.
    UserId
);
entity_id!(
    /// Identifier for an attachment reference.
    AttachmentId
);
entity_id!(
    /// Identifier for a PRC review record.
    ReviewId
);
entity_id!(
    /// Identifier for a funds reservation header.
    FrsId
);
entity_id!(
    /// Identifier for a monitoring activity.
    MonitoringActivityId
);
entity_id!(
    /// Identifier for a monitoring activity group.
    ActivityGroupId
);
entity_id!(
    /// Identifier for an assessment record.
    AssessmentId
);
entity_id!(
    /// Identifier for a country programme.
    CountryProgrammeId
);
entity_id!(
    /// Identifier for a flat location.
    LocationId
);
entity_id!(
    /// Identifier for a section.
    SectionId
);
entity_id!(
    /// Identifier for an office.
    OfficeId
);
entity_id!(
    /// Identifier for a location site used by planned visits.
    SiteId
);
entity_id!(
    /// Identifier for an outbox record.
    OutboxId
);
