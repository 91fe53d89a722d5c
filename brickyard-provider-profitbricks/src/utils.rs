//! Utility functions for identifier handling

/// Separator between the datacenter and load balancer parts of an import id
pub const COMPOSITE_ID_SEPARATOR: char = ';';

/// Split a composite identifier (e.g., "dc-123;lb-456" -> ("dc-123", "lb-456"))
///
/// Returns `None` for a plain identifier or when either part is empty.
pub fn split_composite_id(id: &str) -> Option<(&str, &str)> {
    let (datacenter_id, loadbalancer_id) = id.split_once(COMPOSITE_ID_SEPARATOR)?;
    if datacenter_id.is_empty() || loadbalancer_id.is_empty() {
        return None;
    }
    Some((datacenter_id, loadbalancer_id))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_composite_id() {
        assert_eq!(split_composite_id("dc-123;lb-456"), Some(("dc-123", "lb-456")));
        assert_eq!(split_composite_id("lb-456"), None);
        assert_eq!(split_composite_id(";lb-456"), None);
        assert_eq!(split_composite_id("dc-123;"), None);
    }
}
