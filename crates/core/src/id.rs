//! Unique identifiers for caravan entities.
//!
//! Strongly-typed UUID identifiers via [`domain-key`](https://crates.io/crates/domain-key)
//! `Uuid<D>` wrappers. Each identifier is parameterized by a unique domain
//! marker, so an [`AccountId`] can never be passed where a [`RouteId`] is
//! expected.
//!
//! All ID types are `Copy` (16 bytes, stack-allocated) and support `v4()`
//! for random generation, `nil()`, `parse(&str)`, full serde support, and
//! `Display`/`FromStr`/`Eq`/`Ord`/`Hash`.

use domain_key::define_uuid;

// Re-export for downstream parse error handling
pub use domain_key::UuidParseError;

// Entity identifiers — UUID-based, Copy, 16 bytes each
define_uuid!(pub AccountIdDomain => AccountId);
define_uuid!(pub RouteIdDomain => RouteId);
define_uuid!(pub ActionIdDomain => ActionId);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn account_id_v4_creates_non_nil_uuid() {
        let id = AccountId::v4();
        assert!(!id.is_nil());
    }

    #[test]
    fn route_id_v4_creates_non_nil_uuid() {
        let id = RouteId::v4();
        assert!(!id.is_nil());
    }

    #[test]
    fn action_id_v4_creates_non_nil_uuid() {
        let id = ActionId::v4();
        assert!(!id.is_nil());
    }

    #[test]
    fn id_nil_creates_zero_valued_uuid() {
        let id = RouteId::nil();
        assert!(id.is_nil());
        assert_eq!(id.to_string(), "00000000-0000-0000-0000-000000000000");
    }

    #[test]
    fn id_parse_valid_uuid_string_succeeds() {
        let id = AccountId::parse("550e8400-e29b-41d4-a716-446655440000").unwrap();
        assert!(!id.is_nil());
        assert_eq!(id.to_string(), "550e8400-e29b-41d4-a716-446655440000");
    }

    #[test]
    fn id_parse_invalid_string_returns_error() {
        let result = AccountId::parse("not-a-uuid");
        assert!(result.is_err());
    }

    #[test]
    fn id_serde_roundtrip() {
        let id = ActionId::v4();
        let json = serde_json::to_string(&id).unwrap();
        let back: ActionId = serde_json::from_str(&json).unwrap();
        assert_eq!(id, back);
    }

    #[test]
    fn ids_are_distinct_types() {
        // Compile-time property: mixing AccountId and RouteId does not
        // typecheck; here we only assert value independence.
        let a = AccountId::v4();
        let r = RouteId::v4();
        assert_ne!(a.to_string(), r.to_string());
    }
}
