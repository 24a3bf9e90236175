//! Analyzer behavior on whole files, checked against exact positions.

use indoc::indoc;
use pretty_assertions::assert_eq;
use safejs::guard::{analyze_source, Category, GuardOptions};
use std::path::Path;

/// 1-based line and column of the first occurrence of `needle`.
fn position_of(source: &str, needle: &str) -> (usize, usize) {
    let offset = source
        .find(needle)
        .unwrap_or_else(|| panic!("{needle:?} not in source"));
    let before = &source[..offset];
    let line = before.matches('\n').count() + 1;
    let line_start = before.rfind('\n').map_or(0, |i| i + 1);
    let column = source[line_start..offset].chars().count() + 1;
    (line, column)
}

fn diagnostics(source: &str) -> Vec<(usize, usize, String)> {
    analyze_source(Path::new("foo.rs"), source, &GuardOptions::default())
        .unwrap()
        .diagnostics
        .into_iter()
        .map(|d| (d.line, d.column, d.message))
        .collect()
}

fn expected(source: &str, cases: &[(&str, &str)]) -> Vec<(usize, usize, String)> {
    cases
        .iter()
        .map(|(needle, message)| {
            let (line, column) = position_of(source, needle);
            (line, column, message.to_string())
        })
        .collect()
}

#[test]
fn test_package_level_calls() {
    let source = indoc! {"
        use safejs::raw;

        pub fn foo() {
            let value = raw::null();
            raw::copy_bytes_to_rust(&mut [], value);
            raw::copy_bytes_to_js(value, &[]);

            raw::func_of(|_, _| raw::Native::Undefined);
            raw::global();
            raw::null();
            raw::undefined();
            raw::value_of(());
        }
    "};
    assert_eq!(
        diagnostics(source),
        expected(
            source,
            &[
                (
                    "raw::copy_bytes_to_rust(",
                    "unsafe call to safejs::raw found: raw::copy_bytes_to_rust(...)",
                ),
                (
                    "raw::copy_bytes_to_js(",
                    "unsafe call to safejs::raw found: raw::copy_bytes_to_js(...)",
                ),
                (
                    "raw::func_of(",
                    "unsafe call to safejs::raw found: raw::func_of(...)",
                ),
                (
                    "raw::value_of(",
                    "unsafe call to safejs::raw found: raw::value_of(...)",
                ),
            ]
        )
    );
}

#[test]
fn test_aliased_import() {
    let source = indoc! {r#"
        use safejs::raw as alias;

        pub fn foo() {
            let value = alias::value_of("foo");
            value.string();
        }
    "#};
    assert_eq!(
        diagnostics(source),
        expected(
            source,
            &[
                (
                    "alias::value_of(",
                    "unsafe call to safejs::raw found: alias::value_of(...)",
                ),
                (
                    "value.string(",
                    "unsafe method call on safejs::raw::Value found: value.string(...)",
                ),
            ]
        )
    );
}

#[test]
fn test_method_calls() {
    let source = indoc! {r#"
        use safejs::raw;

        pub fn foo(err: raw::Error, value: raw::Value, typ: raw::Type) {
            err.error();
            value.bool();
            value.call("", &[]);
            value.delete("");
            value.equal(&value);
            value.float();
            value.get("");
            value.index(0);
            value.instance_of(&value);
            value.int();
            value.invoke(&[]);
            value.is_nan();
            value.is_null();
            value.is_undefined();
            value.length();
            value.new(&[]);
            value.set("", ());
            value.set_index(0, ());
            value.string();
            value.truthy();
            value.type_of();
            typ.as_str();
            typ.to_string();
        }
    "#};
    let method = |name: &str| {
        format!("unsafe method call on safejs::raw::Value found: value.{name}(...)")
    };
    let unsafe_methods = [
        "bool",
        "call",
        "delete",
        "float",
        "get",
        "index",
        "instance_of",
        "int",
        "invoke",
        "length",
        "new",
        "set",
        "set_index",
        "string",
        "truthy",
    ];
    let mut want = vec![{
        let (line, column) = position_of(source, "err.error(");
        (
            line,
            column,
            "unsafe method call on safejs::raw::Error found: err.error(...)".to_string(),
        )
    }];
    for name in unsafe_methods {
        let (line, column) = position_of(source, &format!("value.{name}("));
        want.push((line, column, method(name)));
    }
    assert_eq!(diagnostics(source), want);
}

#[test]
fn test_file_without_raw_import_is_skipped() {
    let source = indoc! {r#"
        mod raw {
            pub fn value_of(_: i32) {}
        }

        pub fn foo() {
            raw::value_of(1);
        }
    "#};
    let report = analyze_source(Path::new("foo.rs"), source, &GuardOptions::default()).unwrap();
    assert!(!report.scanned);
    assert!(report.diagnostics.is_empty());
}

#[test]
fn test_grouped_and_renamed_imports() {
    let source = indoc! {r#"
        use safejs::raw::{func_of, Value as JsValue};

        fn foo(v: JsValue) -> JsValue {
            func_of(|this, _| this.into());
            v.get("x")
        }
    "#};
    let report = analyze_source(Path::new("foo.rs"), source, &GuardOptions::default()).unwrap();
    let categories: Vec<_> = report.diagnostics.iter().map(|d| d.category).collect();
    assert_eq!(categories, vec![Category::PackageCall, Category::MethodCall]);
    assert_eq!(
        report.diagnostics[0].message,
        "unsafe call to safejs::raw found: func_of(...)"
    );
}

#[test]
fn test_wrapped_calls_pass_and_strict_reports_them() {
    let source = indoc! {r#"
        use safejs::{catch, raw};

        pub fn name(value: raw::Value) -> safejs::Result<String> {
            catch::attempt(|| value.get("name").string())
        }
    "#};
    assert!(diagnostics(source).is_empty());

    let strict = GuardOptions {
        strict: true,
        ..GuardOptions::default()
    };
    let report = analyze_source(Path::new("foo.rs"), source, &strict).unwrap();
    let messages: Vec<_> = report.diagnostics.iter().map(|d| d.message.as_str()).collect();
    assert_eq!(
        messages,
        vec![
            "unsafe method call on safejs::raw::Value found: value.get(\"name\").string(...)",
            "unsafe method call on safejs::raw::Value found: value.get(...)",
        ]
    );
}

/// The wrapper layer itself must route every raw call through the recovery
/// boundary. Only its unit tests may touch the raw layer directly.
#[test]
fn test_wrapper_layer_has_no_unguarded_calls() {
    let options = GuardOptions {
        unsafe_paths: vec!["crate::raw".to_string()],
        ..GuardOptions::default()
    };
    let root = Path::new(env!("CARGO_MANIFEST_DIR")).join("src");
    for name in ["value.rs", "func.rs", "bytes.rs", "global.rs", "error.rs"] {
        let path = root.join(name);
        let source = std::fs::read_to_string(&path).unwrap();
        let (tests_line, _) = position_of(&source, "#[cfg(test)]");
        let report = analyze_source(&path, &source, &options).unwrap();
        assert!(report.scanned, "{name} was not scanned");
        let outside_tests: Vec<_> = report
            .diagnostics
            .iter()
            .filter(|d| d.line < tests_line)
            .map(ToString::to_string)
            .collect();
        assert_eq!(outside_tests, Vec::<String>::new(), "{name}");
    }
}

#[test]
fn test_values_returned_by_local_functions_and_methods() {
    let source = indoc! {"
        use safejs::raw;

        fn make() -> raw::Value {
            raw::null()
        }

        struct Holder {
            inner: raw::Value,
        }

        impl Holder {
            fn get(&self) -> raw::Value {
                self.inner
            }

            fn name(&self) -> String {
                self.get().string()
            }
        }

        pub fn foo() {
            let v = make();
            v.int();
        }
    "};
    assert_eq!(
        diagnostics(source),
        expected(
            source,
            &[
                (
                    "self.get().string()",
                    "unsafe method call on safejs::raw::Value found: self.get().string(...)",
                ),
                (
                    "v.int()",
                    "unsafe method call on safejs::raw::Value found: v.int(...)",
                ),
            ]
        )
    );
}

#[test]
fn test_container_element_bindings() {
    let source = indoc! {"
        use safejs::raw;

        pub fn foo(vals: Vec<raw::Value>, o: Option<raw::Value>) {
            for v in vals.iter() {
                v.bool();
            }
            if let Some(first) = o {
                first.float();
            }
            let _ = vals.iter().map(|x| x.truthy()).count();
        }
    "};
    assert_eq!(
        diagnostics(source),
        expected(
            source,
            &[
                (
                    "v.bool()",
                    "unsafe method call on safejs::raw::Value found: v.bool(...)",
                ),
                (
                    "first.float()",
                    "unsafe method call on safejs::raw::Value found: first.float(...)",
                ),
                (
                    "x.truthy()",
                    "unsafe method call on safejs::raw::Value found: x.truthy(...)",
                ),
            ]
        )
    );
}

#[test]
fn test_repeat_macro_body() {
    let source = indoc! {"
        use safejs::raw;

        pub fn foo() {
            let _ = vec![raw::value_of(1); 3];
        }
    "};
    assert_eq!(
        diagnostics(source),
        expected(
            source,
            &[(
                "raw::value_of(",
                "unsafe call to safejs::raw found: raw::value_of(...)",
            )]
        )
    );
}

#[test]
fn test_data_conversions_are_not_reported() {
    let source = indoc! {"
        use safejs::raw;

        pub fn foo(v: raw::Value, t: raw::Type) -> bool {
            let _ = raw::Native::from(1);
            let _ = v.clone();
            t.is_object()
        }
    "};
    assert!(diagnostics(source).is_empty());
}

#[test]
fn test_closure_escaping_recovery_is_reported() {
    let source = indoc! {"
        use safejs::{catch, raw};

        pub fn foo() {
            let _ = catch::attempt(|| move || raw::value_of(1));
        }
    "};
    assert_eq!(
        diagnostics(source),
        expected(
            source,
            &[(
                "raw::value_of(",
                "unsafe call to safejs::raw found: raw::value_of(...)",
            )]
        )
    );
}
