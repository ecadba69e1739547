use core::pin::Pin;

/// Returns a pinned mutable reference to the element at `index`, or `None` if
/// the index is out of bounds.
#[inline]
pub(crate) fn get_pin_mut_from_vec<T>(vec: Pin<&mut Vec<T>>, index: usize) -> Option<Pin<&mut T>> {
    // SAFETY: the vec is never resized or reordered while pinned, and
    // `get_mut` does not move any element. `x` is guaranteed to be pinned
    // because it comes from `vec` which is pinned.
    unsafe {
        vec.get_unchecked_mut()
            .get_mut(index)
            .map(|x| Pin::new_unchecked(x))
    }
}
