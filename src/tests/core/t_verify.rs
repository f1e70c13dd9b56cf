use crate::core::diag::Span;
use crate::core::infer::{ImportEnv, desugar_program, infer_program};
use crate::core::names::ModuleName;
use crate::core::parse::parse_tops;
use crate::core::resolve::{Builtins, ImportOutcome, ImportResolver, resolve_program};
use crate::core::tree::typed::TypedModule;
use crate::core::verify::{VerifyError, verify_program};

struct NoImports;

impl ImportResolver for NoImports {
    fn lookup(&mut self, path: &str, _span: Span) -> ImportOutcome {
        ImportOutcome::NotFound(path.to_string())
    }
}

fn typed(source: &str) -> TypedModule {
    let (module, errors) = parse_tops(source);
    assert!(errors.is_empty(), "parse errors: {errors:?}");
    let outcome = resolve_program(
        ModuleName(0),
        &Builtins::default(),
        &module.expect("tree"),
        &mut NoImports,
    );
    let resolved = outcome.result.expect("resolve result").module;
    infer_program(&ImportEnv::default(), desugar_program(resolved))
        .typed
        .expect("typed module")
}

#[test]
fn division_by_constant_zero_is_flagged() {
    let errors = verify_program(&typed("let x = 1 / 0"));
    assert!(matches!(errors.as_slice(), [VerifyError::DivisionByZero(_)]));
}

#[test]
fn statically_false_assertion_is_flagged() {
    let errors = verify_program(&typed("let a = assert false"));
    assert!(matches!(
        errors.as_slice(),
        [VerifyError::AssertAlwaysFalse(_)]
    ));
}

#[test]
fn verification_looks_inside_lambdas() {
    let errors = verify_program(&typed("let f = fn a -> a + 1 / 0"));
    assert!(matches!(errors.as_slice(), [VerifyError::DivisionByZero(_)]));
}

#[test]
fn clean_module_verifies_empty() {
    let errors = verify_program(&typed("let x = 4 / 2\nlet ok = assert (1 < 2)"));
    assert!(errors.is_empty(), "unexpected: {errors:?}");
}
