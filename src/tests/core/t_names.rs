use crate::core::names::NameAlloc;

#[test]
fn fresh_names_are_distinct() {
    let alloc = NameAlloc::new();
    let a = alloc.fresh();
    let b = alloc.fresh();
    assert_ne!(a, b);
}

#[test]
fn clones_share_one_counter() {
    let alloc = NameAlloc::new();
    let clone = alloc.clone();
    let a = alloc.fresh();
    let b = clone.fresh();
    let c = alloc.fresh();
    assert_ne!(a, b);
    assert_ne!(b, c);
    assert_ne!(a, c);
}
