use runmat_mx::{
    to_default, to_mapping, ElementType, ForeignAllocator, ForeignValue, HostArray, HostValue,
    IndexMap, MxError, Ownership, ToForeign, ValueKind,
};

fn assert_ownership_error<T: std::fmt::Debug>(result: Result<T, MxError>) {
    match result {
        Err(MxError::Ownership { actual, .. }) => assert_eq!(actual, Ownership::Released),
        other => panic!("expected an ownership error, got {other:?}"),
    }
}

#[test]
fn every_operation_fails_after_release() {
    let alloc = ForeignAllocator::new();
    let mut v = alloc.create(ElementType::Float64, &[2, 2]).unwrap();
    v.release().unwrap();
    assert_eq!(alloc.bytes_in_use(), 0);
    assert_eq!(alloc.live_values(), 0);

    assert_ownership_error(v.release());
    assert_ownership_error(v.transfer_to_session());
    assert_ownership_error(v.duplicate());
    assert_ownership_error(v.shape());
    assert_ownership_error(v.kind());
    assert_ownership_error(v.element_type());
    assert_ownership_error(v.is_complex());
    assert_ownership_error(v.is_sparse());
    assert_ownership_error(v.numel());
    assert_ownership_error(v.element_size());
    assert_ownership_error(v.real::<f64>());
    assert_ownership_error(v.real_mut::<f64>().map(|s| s.len()));
    assert_ownership_error(v.array());
    assert_ownership_error(to_default(&v));
}

#[test]
fn mapping_round_trips_through_a_struct() {
    let mut map = IndexMap::new();
    map.insert("a".to_string(), HostValue::from(1.0));
    map.insert("b".to_string(), HostValue::from("x"));
    map.insert(
        "c".to_string(),
        HostValue::Array(HostArray::row_major(vec![1.0, 2.0, 3.0], vec![1, 3]).unwrap()),
    );

    let s = map.to_foreign().unwrap();
    assert_eq!(s.kind().unwrap(), ValueKind::Struct);
    assert_eq!(s.shape().unwrap(), &[1, 1]);
    assert_eq!(
        s.field_names().unwrap(),
        &["a".to_string(), "b".to_string(), "c".to_string()]
    );

    let back = to_mapping(&s).unwrap();
    assert_eq!(back, map);
    assert_eq!(to_default(&s).unwrap(), HostValue::Map(map));
}

#[test]
fn nested_cell_contents_are_deep_copies() {
    let inner = vec![HostValue::from(1i32), HostValue::from("in")];
    let outer = vec![HostValue::Cell(inner.clone()), HostValue::from(true)];
    let mut v = outer.to_foreign().unwrap();
    let copy = v.duplicate().unwrap();

    let replacement = ForeignValue::create_string("changed").unwrap();
    v.set_cell(0, replacement).unwrap();

    assert_eq!(to_default(&copy).unwrap(), HostValue::Cell(outer));
    assert_eq!(to_default(v.cell_at(0).unwrap()).unwrap(), HostValue::from("changed"));
}

#[test]
fn limited_allocator_rejects_large_conversions() {
    let alloc = ForeignAllocator::with_limit(4096);
    let big = HostArray::column_major(vec![0.0f64; 1024], vec![32, 32]).unwrap();
    assert!(matches!(big.to_foreign_in(&alloc), Err(MxError::Allocation { .. })));
    assert_eq!(alloc.bytes_in_use(), 0);
    let small = HostArray::column_major(vec![0.0f64; 16], vec![4, 4]).unwrap();
    let v = small.to_foreign_in(&alloc).unwrap();
    assert_eq!(v.ownership(), Ownership::HostOwned);
}
