//! Equality policies.
//!
//! A comparer decides whether a new value is observably different from the
//! previous one. Cells use it to skip no-op writes; computeds use it to
//! decide whether a re-evaluation propagates to their observers.

use std::rc::Rc;

/// Shared equality predicate: `true` means "equal, do not propagate".
pub type Comparer<T> = Rc<dyn Fn(&T, &T) -> bool>;

/// Value equality via `PartialEq`. The default policy.
pub fn structural<T: PartialEq + 'static>() -> Comparer<T> {
    Rc::new(|a: &T, b: &T| a == b)
}

/// Pointer identity for shared values.
pub fn identity<U: ?Sized + 'static>() -> Comparer<Rc<U>> {
    Rc::new(|a: &Rc<U>, b: &Rc<U>| Rc::ptr_eq(a, b))
}

/// Treat every new value as a change.
pub fn never_equal<T: 'static>() -> Comparer<T> {
    Rc::new(|_: &T, _: &T| false)
}
