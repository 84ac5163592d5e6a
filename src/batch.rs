use std::num::NonZeroUsize;
use std::slice::Chunks;

/// Largest number of scene ids the Orders API accepts in a single product.
pub const MAX_ITEMS_PER_ORDER: NonZeroUsize = match NonZeroUsize::new(500) {
    Some(n) => n,
    None => panic!("MAX_ITEMS_PER_ORDER must be non-zero"),
};

/// Splits `items` into consecutive slices of at most `chunk_size` elements,
/// preserving order. Only the final slice may be shorter.
///
/// The returned iterator is lazy and single-pass; call `chunk` again to restart.
pub fn chunk<T>(items: &[T], chunk_size: NonZeroUsize) -> Chunks<'_, T> {
    items.chunks(chunk_size.get())
}
