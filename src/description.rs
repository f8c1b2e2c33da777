//! The capability bundle that tells an [`AssocArray`] how to treat its
//! elements.
//!
//! The table stores bare `Copy` elements with no separate key storage and no
//! per-slot occupancy tag. Everything it needs to know about an element is
//! answered by a caller-supplied [`Description`], from hashing and key
//! equality down to what the empty sentinel looks like. Real descriptions
//! live with the embedding code; the trait here is the whole contract.
//!
//! [`AssocArray`]: crate::assoc_array::AssocArray

/// Describes hashing, equality, and emptiness for one element type.
///
/// An element must contain its key; there is no separate buffer for keys.
/// The description defines how to generate hash values for keys and
/// elements, how to compare them, and how to check for empty slots.
///
/// # Coherence
///
/// For any element `e` with key `k`, the implementation must guarantee
/// `hash_key(k) == hash_element(e)` and `key_matches_element(k, e)`.
/// Violations corrupt the table silently: an element inserted under one
/// hash becomes unreachable under the other.
///
/// The empty sentinel must be distinguishable from every legitimate element
/// value through [`is_empty_element`] alone, and `is_empty_element` must
/// hold after [`clear_element`] returns.
///
/// [`is_empty_element`]: Description::is_empty_element
/// [`clear_element`]: Description::clear_element
pub trait Description {
    /// The lookup key type. Elements embed their key; this is the
    /// standalone form callers pass to keyed operations.
    type Key;

    /// The stored element type. Elements are bitwise-copied into slots on
    /// insert and relocated bitwise on rehash and chain repair, so the type
    /// must be `Copy`.
    type Element: Copy;

    /// Produces the empty sentinel value. Freshly allocated slots are
    /// filled with it, and [`clear_element`] writes it by default.
    ///
    /// [`clear_element`]: Description::clear_element
    fn empty_element(&self) -> Self::Element;

    /// Returns `true` if the slot holds the empty sentinel.
    fn is_empty_element(&self, element: &Self::Element) -> bool;

    /// Hashes a standalone key.
    fn hash_key(&self, key: &Self::Key) -> u32;

    /// Hashes the key embedded in an element. Must agree with
    /// [`hash_key`] on the element's own key.
    ///
    /// [`hash_key`]: Description::hash_key
    fn hash_element(&self, element: &Self::Element) -> u32;

    /// Returns `true` if `key` is the key embedded in `element`.
    fn key_matches_element(&self, key: &Self::Key, element: &Self::Element) -> bool;

    /// Key-based equality between two elements.
    fn element_matches_element(&self, left: &Self::Element, right: &Self::Element) -> bool;

    /// Resets a slot to the empty sentinel in place.
    fn clear_element(&self, element: &mut Self::Element) {
        *element = self.empty_element();
    }

    /// Releases any payload owned through the element.
    ///
    /// Only [`AssocArray::clear_and_delete`] calls this, and it calls it
    /// for every slot, used or empty. An implementation that owns payloads
    /// must therefore either tolerate empty slots or check
    /// [`is_empty_element`] itself. The default does nothing.
    ///
    /// [`AssocArray::clear_and_delete`]: crate::assoc_array::AssocArray::clear_and_delete
    /// [`is_empty_element`]: Description::is_empty_element
    fn delete_element(&self, _element: &mut Self::Element) {}
}
