use std::fs;

use vigil_analyze::{analyze, CheckKind};
use vigil_backend_c::{TranslateError, Translator, TranslatorConfig, ARTIFACT_FILE_NAME};

fn translator(dir: &tempfile::TempDir) -> Translator {
    Translator::new(TranslatorConfig::default().with_output_dir(dir.path()))
}

#[test]
fn typed_addition_round_trips_to_c_function() {
    let dir = tempfile::tempdir().unwrap();
    let src = "def f(a: int, b: int) -> int:\n    return a + b\n";
    let art = translator(&dir).translate(src, None).unwrap();

    assert!(art.c_source.contains("int f(int a, int b) {\n    return a + b;\n}\n"));
    assert!(art.c_source.contains("#include <assert.h>"));
    assert!(art.c_source.contains("int main() {"));
    assert_eq!(art.functions, vec!["f".to_string()]);
    assert!(art.exercises(CheckKind::Overflow));
    assert!(!art.uses_verifier_convention);
}

#[test]
fn artifact_is_persisted_and_overwritten() {
    let dir = tempfile::tempdir().unwrap();
    let t = translator(&dir);

    let first = t.translate("x = 1\n", None).unwrap();
    let path = dir.path().join(ARTIFACT_FILE_NAME);
    assert_eq!(first.saved_path.as_deref(), Some(path.as_path()));
    assert!(fs::read_to_string(&path).unwrap().contains("int x = 1;"));

    t.translate("y = 2\n", None).unwrap();
    let on_disk = fs::read_to_string(&path).unwrap();
    assert!(on_disk.contains("int y = 2;"));
    assert!(!on_disk.contains("int x = 1;"));
}

#[test]
fn unwritable_output_dir_warns_without_failing() {
    let dir = tempfile::tempdir().unwrap();
    let blocker = dir.path().join("not-a-dir");
    fs::write(&blocker, "").unwrap();

    let art = Translator::new(TranslatorConfig::default().with_output_dir(&blocker))
        .translate("def f():\n    return 1\n", None)
        .unwrap();
    assert!(art.saved_path.is_none());
    assert!(art.save_warning.is_some());
    assert!(art.c_source.contains("int f(void)"));
}

#[test]
fn verifier_convention_widens_and_declares_primitives() {
    let dir = tempfile::tempdir().unwrap();
    let src = r#"import esbmc

def scale(x):
    return x * 3

a = esbmc.nondet_uint()
b = esbmc.nondet_uint()
esbmc.assume(a < 100)
r = scale(a)
assert r >= a, "scale grows"
"#;
    let art = translator(&dir).translate(src, None).unwrap();
    let c = &art.c_source;

    assert!(art.uses_verifier_convention);
    assert!(!c.contains("#include <assert.h>"));
    assert_eq!(c.matches("unsigned int nondet_uint();").count(), 1);
    assert!(c.contains("unsigned int scale(unsigned int x) {"));
    assert!(c.contains("    unsigned int a = nondet_uint();\n"));
    assert!(c.contains("    unsigned int b = nondet_uint();\n"));
    assert!(c.contains("    __ESBMC_assume(a < 100);\n"));
    assert!(c.contains("    unsigned int r = scale(a);\n"));
    assert!(c.contains("    __ESBMC_assert(r >= a, \"scale grows\");\n"));
}

#[test]
fn aliased_verifier_module_and_typed_primitives() {
    let dir = tempfile::tempdir().unwrap();
    let src = "import esbmc as v\nflag = v.nondet_bool()\nassert flag or not flag\n";
    let art = translator(&dir).translate(src, None).unwrap();

    assert!(art.c_source.contains("_Bool nondet_bool();"));
    assert!(art.c_source.contains("_Bool flag = nondet_bool();"));
    assert!(art.c_source.contains("__ESBMC_assert(((flag) || (!(flag))), \"assertion\");"));
}

#[test]
fn analyzer_checks_are_merged_after_local_findings() {
    let dir = tempfile::tempdir().unwrap();
    let src = "def f(xs, i):\n    for k in xs:\n        pass\n    return i / 2\n";
    let profile = analyze(src).unwrap();
    let art = translator(&dir).translate(src, Some(&profile)).unwrap();

    assert!(art.c_source.contains("/* unsupported: for loop over non-range iterable */"));
    assert_eq!(art.checks[0], CheckKind::DivByZero);
    for check in &profile.recommended_checks {
        assert!(art.exercises(*check));
    }
}

#[test]
fn module_statements_keep_source_order_in_main() {
    let dir = tempfile::tempdir().unwrap();
    let src = "a = 1\nb = a + 2\nprint(b)\nassert b == 3\n";
    let art = translator(&dir).translate(src, None).unwrap();
    let c = &art.c_source;

    let ia = c.find("int a = 1;").unwrap();
    let ib = c.find("int b = (a + 2);").unwrap();
    let ic = c.find("assert(b == 3);").unwrap();
    assert!(ia < ib && ib < ic);
    assert!(!c.contains("print"));
    assert!(c.ends_with("    return 0;\n}\n"));
}

#[test]
fn class_only_module_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let err = translator(&dir)
        .translate("class Empty:\n    pass\n", None)
        .unwrap_err();
    let TranslateError::Unsupported { reason } = err else {
        panic!("expected unsupported input");
    };
    assert!(reason.contains("no translatable"));
}
