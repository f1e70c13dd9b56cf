use indoc::indoc;

use crate::core::parse::parse_tops;
use crate::core::tree::parsed::{ExprKind, Module};

fn parse_ok(source: &str) -> Module {
    let (module, errors) = parse_tops(source);
    assert!(errors.is_empty(), "unexpected parse errors: {errors:?}");
    module.expect("source should produce a tree")
}

#[test]
fn parses_imports_and_lets() {
    let module = parse_ok(indoc! {r#"
        import "./util" as u
        let x = 1
    "#});
    assert_eq!(module.imports.len(), 1);
    assert_eq!(module.imports[0].path, "./util");
    assert_eq!(module.imports[0].alias, "u");
    assert_eq!(module.lets.len(), 1);
    assert_eq!(module.lets[0].name, "x");
}

#[test]
fn default_alias_is_the_path_stem() {
    let module = parse_ok(indoc! {r#"
        import "std/prelude"
        import "./b"
    "#});
    assert_eq!(module.imports[0].alias, "prelude");
    assert_eq!(module.imports[1].alias, "b");
}

#[test]
fn let_params_collect_as_sugar() {
    let module = parse_ok("let add a b = a + b");
    assert_eq!(module.lets[0].params.len(), 2);
    assert_eq!(module.lets[0].params[0].name, "a");
    assert_eq!(module.lets[0].params[1].name, "b");
}

#[test]
fn application_is_left_associative() {
    let module = parse_ok("let y = f x 1");
    let ExprKind::Apply { func, arg } = &module.lets[0].body.kind else {
        panic!("expected application");
    };
    assert!(matches!(arg.kind, ExprKind::IntLit(1)));
    let ExprKind::Apply { func: inner, arg } = &func.kind else {
        panic!("expected nested application");
    };
    assert!(matches!(&inner.kind, ExprKind::Var(name) if name == "f"));
    assert!(matches!(&arg.kind, ExprKind::Var(name) if name == "x"));
}

#[test]
fn lambda_and_if_parse() {
    let module = parse_ok("let min = fn a b -> if a < b then a else b");
    let ExprKind::Lambda { params, body } = &module.lets[0].body.kind else {
        panic!("expected lambda");
    };
    assert_eq!(params.len(), 2);
    assert!(matches!(body.kind, ExprKind::If { .. }));
}

#[test]
fn member_references_parse() {
    let module = parse_ok(indoc! {r#"
        import "./u"
        let v = u.item
    "#});
    let ExprKind::Member { alias, member } = &module.lets[0].body.kind else {
        panic!("expected member reference");
    };
    assert_eq!(alias, "u");
    assert_eq!(member, "item");
}

#[test]
fn precedence_binds_mul_over_add() {
    let module = parse_ok("let x = 1 + 2 * 3");
    let ExprKind::Binary { op, rhs, .. } = &module.lets[0].body.kind else {
        panic!("expected binary");
    };
    assert_eq!(*op, crate::core::tree::BinaryOp::Add);
    assert!(matches!(
        rhs.kind,
        ExprKind::Binary {
            op: crate::core::tree::BinaryOp::Mul,
            ..
        }
    ));
}

#[test]
fn broken_decl_resynchronizes_at_next_keyword() {
    let (module, errors) = parse_tops(indoc! {r#"
        let = 1
        let ok = 2
    "#});
    assert_eq!(errors.len(), 1);
    let module = module.expect("recovered tree should exist");
    assert_eq!(module.lets.len(), 1);
    assert_eq!(module.lets[0].name, "ok");
}

#[test]
fn empty_source_parses_to_empty_module() {
    let (module, errors) = parse_tops("");
    assert!(errors.is_empty());
    let module = module.expect("empty module");
    assert!(module.imports.is_empty() && module.lets.is_empty());
}

#[test]
fn hopeless_source_produces_no_tree() {
    let (module, errors) = parse_tops("x y z");
    assert!(module.is_none());
    assert!(!errors.is_empty());
}
