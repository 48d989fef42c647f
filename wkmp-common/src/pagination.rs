//! Pagination clamping shared by every catalog list endpoint.
//!
//! All pagination is `offset`+`size`. `size=0` means "use the default
//! size"; anything above the configured maximum is clamped down to it.

/// Resolved offset/limit pair ready to bind into a `LIMIT ? OFFSET ?` query.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Page {
    pub offset: i64,
    pub limit: i64,
}

/// Clamp a caller-supplied `(offset, size)` pair against the configured
/// default/maximum page sizes.
pub fn clamp_page(offset: Option<i64>, size: Option<i64>, default_size: i64, max_size: i64) -> Page {
    let offset = offset.unwrap_or(0).max(0);
    let limit = match size {
        None | Some(0) => default_size,
        Some(s) => s.clamp(1, max_size),
    };

    Page { offset, limit }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_size_uses_default() {
        let p = clamp_page(Some(10), Some(0), 50, 500);
        assert_eq!(p, Page { offset: 10, limit: 50 });
    }

    #[test]
    fn missing_size_uses_default() {
        let p = clamp_page(None, None, 50, 500);
        assert_eq!(p, Page { offset: 0, limit: 50 });
    }

    #[test]
    fn oversized_request_is_clamped_to_max() {
        let p = clamp_page(Some(0), Some(10_000), 50, 500);
        assert_eq!(p, Page { offset: 0, limit: 500 });
    }

    #[test]
    fn negative_offset_is_clamped_to_zero() {
        let p = clamp_page(Some(-5), Some(20), 50, 500);
        assert_eq!(p.offset, 0);
    }
}
