//! Value object trait: equality by value, not identity.

/// Marker trait for value objects.
///
/// Value objects have **no identity** and no event queue: two values with the
/// same attributes are the same value. They live inside an entity (e.g. a
/// buyer detail's postal address) and are replaced, or edited in place
/// through their owning entity, never loaded on their own.
///
/// ```ignore
/// #[derive(Debug, Clone, PartialEq, Eq)]
/// struct Address { country: String, state: String }
///
/// impl ValueObject for Address {}
/// ```
pub trait ValueObject: Clone + PartialEq + core::fmt::Debug {}
