use crate::ZoneName;

/// Default page size for reservation listings.
pub const DEFAULT_LIMIT: usize = 100;

/// Builder for reservation listings.
///
/// A zone filter returns every reservation in that zone; offset and limit
/// only apply to unfiltered listings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReservationQuery {
    /// Restrict to a single zone.
    pub zone: Option<ZoneName>,

    /// Number of reservations to skip.
    pub offset: usize,

    /// Maximum number of reservations to return.
    pub limit: usize,
}

impl Default for ReservationQuery {
    fn default() -> Self {
        Self {
            zone: None,
            offset: 0,
            limit: DEFAULT_LIMIT,
        }
    }
}

impl ReservationQuery {
    /// Creates a query for the first page of all reservations.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a query for one zone.
    pub fn for_zone(zone: impl Into<ZoneName>) -> Self {
        Self {
            zone: Some(zone.into()),
            ..Default::default()
        }
    }

    /// Filters by zone.
    pub fn zone(mut self, zone: impl Into<ZoneName>) -> Self {
        self.zone = Some(zone.into());
        self
    }

    /// Skips this many reservations before returning results.
    pub fn offset(mut self, offset: usize) -> Self {
        self.offset = offset;
        self
    }

    /// Limits the number of reservations returned.
    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = limit;
        self
    }
}
