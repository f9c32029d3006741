mod common;

use common::{eval, py};
use pyhost_runtime::{check_and_translate, CompareOp, Error, PyHandle};
use std::cmp::Ordering;

// ============================================================================
// Lifetime Tests
// ============================================================================

#[test]
fn test_double_dispose_does_not_double_decrement() {
    let object = eval("object()");
    let baseline = object.ref_count().unwrap();

    let mut clone = object.clone_ref().unwrap();
    assert_eq!(object.ref_count().unwrap(), baseline + 1);

    clone.dispose();
    clone.dispose();
    assert!(clone.is_disposed());
    assert_eq!(object.ref_count().unwrap(), baseline);
}

#[test]
fn test_drop_releases_reference() {
    let object = eval("object()");
    let baseline = object.ref_count().unwrap();
    {
        let _clone = object.clone_ref().unwrap();
        assert_eq!(object.ref_count().unwrap(), baseline + 1);
    }
    assert_eq!(object.ref_count().unwrap(), baseline);
}

#[test]
fn test_clone_is_same_object() {
    let list = eval("[1, 2]");
    let mut clone = list.clone_ref().unwrap();
    assert!(list.is(&clone));

    clone.dispose();
    assert_eq!(list.repr().unwrap(), "[1, 2]");
}

#[test]
fn test_disposed_handle_rejects_use() {
    let mut object = eval("[]");
    object.dispose();

    assert!(matches!(object.repr(), Err(Error::Disposed)));
    assert!(matches!(object.clone_ref(), Err(Error::Disposed)));
    assert!(matches!(object.call(&[]), Err(Error::Disposed)));
}

#[test]
fn test_handle_dropped_on_another_thread() {
    let object = eval("object()");
    let baseline = object.ref_count().unwrap();
    let clone = object.clone_ref().unwrap();

    std::thread::spawn(move || drop(clone)).join().unwrap();

    assert_eq!(object.ref_count().unwrap(), baseline);
}

// ============================================================================
// Immortal Tests
// ============================================================================

#[test]
fn test_immortal_singletons() {
    common::env();
    let none = PyHandle::none();
    assert!(none.is_none());
    assert!(none.is_immortal());
    assert!(eval("None").is(&none));

    assert!(PyHandle::bool(true).is(&eval("1 == 1")));
    assert!(PyHandle::bool(false).is(&eval("1 == 2")));
    assert!(!eval("0").is_immortal());
}

#[test]
fn test_disposing_immortal_keeps_singleton_usable() {
    common::env();
    let mut none = PyHandle::none();
    none.dispose();
    none.dispose();
    assert!(PyHandle::none().is(&eval("None")));
    assert_eq!(PyHandle::none().repr().unwrap(), "None");
}

// ============================================================================
// Object Protocol Tests
// ============================================================================

#[test]
fn test_equality_and_ordering() {
    let one = py(&1i64);
    let two = py(&2i64);

    assert!(one.equals(&eval("1.0")).unwrap());
    assert!(!one.equals(&two).unwrap());
    assert!(one.rich_compare(&two, CompareOp::Lt).unwrap());
    assert_eq!(one.partial_compare(&two).unwrap(), Some(Ordering::Less));
    assert_eq!(two.partial_compare(&one).unwrap(), Some(Ordering::Greater));
    assert_eq!(one.partial_compare(&eval("1")).unwrap(), Some(Ordering::Equal));
}

#[test]
fn test_unorderable_comparison_raises() {
    let err = py(&1i64).partial_compare(&py("a")).unwrap_err();
    assert_eq!(err.as_python().unwrap().type_name(), "TypeError");
    check_and_translate().unwrap();
}

#[test]
fn test_attributes() {
    let globals = common::module("class Box:\n    pass\nbox = Box()\n");
    let instance = common::lookup(&globals, "box");

    assert!(!instance.has_attr("value").unwrap());
    instance.set_attr("value", &py(&5i64)).unwrap();
    assert!(instance.has_attr("value").unwrap());
    assert_eq!(instance.get_attr("value").unwrap().extract::<i64>().unwrap(), 5);
    assert_eq!(instance.type_name().unwrap(), "Box");
}

#[test]
fn test_missing_attribute_translates_and_clears() {
    let err = eval("object()").get_attr("missing").unwrap_err();
    let python = err.as_python().unwrap();
    assert_eq!(python.type_name(), "AttributeError");
    assert!(python.message().contains("missing"));
    check_and_translate().unwrap();
}

#[test]
fn test_truthiness_and_hash() {
    assert!(eval("[0]").is_truthy().unwrap());
    assert!(!eval("''").is_truthy().unwrap());
    assert!(!PyHandle::none().is_truthy().unwrap());
    assert_eq!(py("abc").hash().unwrap(), eval("'abc'").hash().unwrap());

    let err = eval("[]").hash().unwrap_err();
    assert_eq!(err.as_python().unwrap().type_name(), "TypeError");
}

#[test]
fn test_get_item() {
    let mapping = eval("{'a': 1, 'b': [2, 3]}");
    assert_eq!(mapping.get_item("a").unwrap().extract::<i64>().unwrap(), 1);
    assert_eq!(
        mapping.get_item("b").unwrap().extract::<Vec<i64>>().unwrap(),
        vec![2, 3]
    );

    let err = mapping.get_item("c").unwrap_err();
    assert_eq!(err.as_python().unwrap().type_name(), "KeyError");
}

// ============================================================================
// Conversion Tests
// ============================================================================

#[test]
fn test_extract_scalars() {
    assert_eq!(eval("2 ** 40").extract::<i64>().unwrap(), 1 << 40);
    assert_eq!(eval("-7").extract::<i32>().unwrap(), -7);
    assert_eq!(eval("1.5").extract::<f64>().unwrap(), 1.5);
    assert_eq!(eval("3").extract::<f64>().unwrap(), 3.0);
    assert!(eval("True").extract::<bool>().unwrap());
    assert_eq!(eval("'héllo'").extract::<String>().unwrap(), "héllo");
    eval("None").extract::<()>().unwrap();
}

#[test]
fn test_extract_containers() {
    assert_eq!(
        eval("('a', 'b')").extract::<Vec<String>>().unwrap(),
        vec!["a".to_string(), "b".to_string()]
    );
    assert_eq!(eval("None").extract::<Option<i64>>().unwrap(), None);
    assert_eq!(eval("4").extract::<Option<i64>>().unwrap(), Some(4));
}

#[test]
fn test_extract_mismatch() {
    assert!(matches!(
        eval("1.5").extract::<i64>(),
        Err(Error::Conversion { .. })
    ));
    assert!(matches!(
        eval("'abc'").extract::<Vec<String>>(),
        Err(Error::Conversion { .. })
    ));
    assert!(matches!(
        eval("1").extract::<bool>(),
        Err(Error::Conversion { .. })
    ));
    assert!(matches!(
        eval("2 ** 40").extract::<i32>(),
        Err(Error::Conversion { .. })
    ));

    let err = eval("2 ** 80").extract::<i64>().unwrap_err();
    assert_eq!(err.as_python().unwrap().type_name(), "OverflowError");
}

#[test]
fn test_extract_bool_is_not_a_number() {
    let is_bool_mismatch =
        |err: Error| matches!(err, Error::Conversion { ref actual, .. } if actual == "bool");

    assert!(is_bool_mismatch(eval("True").extract::<i64>().unwrap_err()));
    assert!(is_bool_mismatch(eval("False").extract::<i32>().unwrap_err()));
    assert!(is_bool_mismatch(eval("True").extract::<f64>().unwrap_err()));
    assert_eq!(eval("True + 1").extract::<i64>().unwrap(), 2);
}

#[test]
fn test_to_python_values() {
    assert_eq!(py(&vec![1i64, 2, 3]).repr().unwrap(), "[1, 2, 3]");
    assert_eq!(py(&Some("x")).repr().unwrap(), "'x'");
    assert!(py(&None::<i64>).is_none());
    assert!(py(&()).is_none());
    assert!(py(&true).is(&PyHandle::bool(true)));
    assert_eq!(py(&2.5f64).repr().unwrap(), "2.5");
}
