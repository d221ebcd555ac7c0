use std::ops::{Range, RangeInclusive};

/// Status codes delivered on the success channel.
///
/// Any other status is delivered as [`InvokeError::Rejected`](crate::InvokeError::Rejected)
/// with the same result shape. Defaults to `200..300`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SuccessStatuses {
    ranges: Vec<StatusRange>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum StatusRange {
    Single(u16),
    Inclusive(RangeInclusive<u16>),
    Exclusive(Range<u16>),
}

impl Default for SuccessStatuses {
    fn default() -> Self {
        Self::from_exclusive_range(200..300)
    }
}

impl SuccessStatuses {
    /// Only the given status.
    pub fn from_single(status: u16) -> Self {
        Self {
            ranges: vec![StatusRange::Single(status)],
        }
    }

    /// Statuses in `range`, end included.
    pub fn from_inclusive_range(range: RangeInclusive<u16>) -> Self {
        Self {
            ranges: vec![StatusRange::Inclusive(range)],
        }
    }

    /// Statuses in `range`, end excluded.
    pub fn from_exclusive_range(range: Range<u16>) -> Self {
        Self {
            ranges: vec![StatusRange::Exclusive(range)],
        }
    }

    /// Adds a single status.
    #[must_use]
    pub fn add_single(mut self, status: u16) -> Self {
        self.ranges.push(StatusRange::Single(status));
        self
    }

    /// Adds an inclusive range.
    #[must_use]
    pub fn add_inclusive_range(mut self, range: RangeInclusive<u16>) -> Self {
        self.ranges.push(StatusRange::Inclusive(range));
        self
    }

    /// Adds an exclusive range.
    #[must_use]
    pub fn add_exclusive_range(mut self, range: Range<u16>) -> Self {
        self.ranges.push(StatusRange::Exclusive(range));
        self
    }

    /// Whether `status` goes to the success channel.
    pub fn contains(&self, status: u16) -> bool {
        self.ranges.iter().any(|range| match range {
            StatusRange::Single(single) => *single == status,
            StatusRange::Inclusive(range) => range.contains(&status),
            StatusRange::Exclusive(range) => range.contains(&status),
        })
    }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    #[rstest]
    #[case(199, false)]
    #[case(200, true)]
    #[case(204, true)]
    #[case(299, true)]
    #[case(300, false)]
    #[case(404, false)]
    #[case(500, false)]
    fn test_default_is_2xx(#[case] status: u16, #[case] expected: bool) {
        assert_eq!(SuccessStatuses::default().contains(status), expected);
    }

    #[test]
    fn test_combined_ranges() {
        let statuses = SuccessStatuses::from_single(200)
            .add_inclusive_range(300..=304)
            .add_exclusive_range(400..404)
            .add_single(409);

        assert!(statuses.contains(200));
        assert!(!statuses.contains(201));
        assert!(statuses.contains(304));
        assert!(statuses.contains(403));
        assert!(!statuses.contains(404));
        assert!(statuses.contains(409));
    }
}
