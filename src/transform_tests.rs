use std::cell::RefCell;
use std::rc::Rc;

use crate::error::EvalError;
use crate::namespace::{CompiledValue, NamespaceTree};
use crate::scope::ScopeBuilder;
use crate::transform::{extract_imports, to_executable, wrap_for_definition, wrap_for_inline_use};
use crate::value::Value;

fn squash(code: &str) -> String {
    code.chars()
        .filter(|c| !c.is_whitespace())
        .map(|c| if c == '\'' { '"' } else { c })
        .collect()
}

fn tree_with(names: &[(&str, &str)]) -> Rc<RefCell<NamespaceTree>> {
    let tree = Rc::new(RefCell::new(NamespaceTree::new()));
    for (path, name) in names {
        tree.borrow_mut()
            .bind(path, name, CompiledValue::Ready(Value::Number(0.0)));
    }
    tree
}

#[test]
fn test_imports_are_hoisted_out_of_the_body() {
    let split = extract_imports("import { fmt } from 'utils';\nimport x from \"x\";\n<b>{fmt(1)}</b>");
    assert_eq!(
        split.imports,
        vec![
            "import { fmt } from 'utils';".to_string(),
            "import x from \"x\";".to_string()
        ]
    );
    assert_eq!(split.body, "<b>{fmt(1)}</b>");
}

#[test]
fn test_source_without_imports_is_untouched() {
    let split = extract_imports("const important = 1;\nimportant");
    assert!(split.imports.is_empty());
    assert_eq!(split.body, "const important = 1;\nimportant");
}

#[test]
fn test_side_effect_imports_are_hoisted() {
    let split = extract_imports("import './style.css';\n<b>x</b>");
    assert_eq!(split.imports, vec!["import './style.css';".to_string()]);
    assert_eq!(split.body, "<b>x</b>");
}

#[test]
fn test_multi_line_import_is_hoisted_whole() {
    let source = "// helpers\nimport {\n  fmt,\n  pad,\n} from 'utils';\n<b>{fmt(pad(1))}</b>";
    let split = extract_imports(source);
    assert_eq!(split.imports, vec!["import {\n  fmt,\n  pad,\n} from 'utils';".to_string()]);
    assert_eq!(split.body, "<b>{fmt(pad(1))}</b>");
}

#[test]
fn test_import_text_inside_the_body_stays() {
    let source = "const s = `\nimport a from 'b'\n`;\n<b>{s}</b>";
    let split = extract_imports(source);
    assert!(split.imports.is_empty());
    assert_eq!(split.body, source);
}

#[test]
fn test_only_leading_imports_are_hoisted() {
    let source = "import a from 'a';\nconst x = a;\nimport b from 'b';\nx";
    let split = extract_imports(source);
    assert_eq!(split.imports, vec!["import a from 'a';".to_string()]);
    assert!(split.body.starts_with("const x = a;"));
    assert!(split.body.contains("import b from 'b';"));
}

#[test]
fn test_imports_before_a_top_level_return() {
    let split = extract_imports("import a from 'a';\nreturn <b>{a}</b>;");
    assert_eq!(split.imports, vec!["import a from 'a';".to_string()]);
    assert_eq!(split.body, "return <b>{a}</b>;");
}

#[test]
fn test_definition_wrapper_shape() {
    let tree = tree_with(&[("Global", "Zed"), ("Global", "Alpha")]);
    let scope = ScopeBuilder::new(tree).build("Global");
    let wrapped = wrap_for_definition("import a from 'a';\n<span>hi</span>", &scope);

    assert!(wrapped.starts_with("import a from 'a';\nexport default (scope) => (props) => {\n\"use completion\";\n"));
    assert!(wrapped.ends_with("<span>hi</span>\n};\n"));

    let alpha = wrapped.find("const Alpha = scope.Alpha;").unwrap();
    let zed = wrapped.find("const Zed = scope.Zed;").unwrap();
    let h = wrapped.find("const h = scope.h;").unwrap();
    assert!(alpha < zed && zed < h, "bindings must be in sorted key order");
}

#[test]
fn test_wrapping_is_deterministic() {
    let tree = tree_with(&[("Global", "B"), ("Global", "A"), ("X", "C")]);
    let builder = ScopeBuilder::new(tree);
    let first = wrap_for_definition("<A />", &builder.build("X"));
    let second = wrap_for_definition("<A />", &builder.build("X"));
    assert_eq!(first, second);
}

#[test]
fn test_inline_wrapper_keeps_body_as_a_literal() {
    let tree = tree_with(&[]);
    let scope = ScopeBuilder::new(tree).build("Global");
    let wrapped = wrap_for_inline_use("<p>\"quoted\"</p>", &scope);
    assert!(wrapped.starts_with("export default (scope, transform) => {\n"));
    assert!(wrapped.contains(r#"return eval(transform("<p>\"quoted\"</p>"));"#));
    assert!(!wrapped.contains("use completion"));
}

#[test]
fn test_intrinsic_markup_becomes_factory_call() {
    let code = to_executable("<span>hi</span>").unwrap();
    assert!(squash(&code).contains(r#"h("span",null,["hi"])"#), "{}", code);
}

#[test]
fn test_component_and_member_tags_are_references() {
    let code = squash(&to_executable("<Cards.Badge label=\"new\"><Icon /></Cards.Badge>").unwrap());
    assert!(
        code.contains(r#"h(Cards.Badge,{label:"new"},[h(Icon,null,null)])"#),
        "{}",
        code
    );
}

#[test]
fn test_fragments_and_expressions() {
    let code = squash(&to_executable("<>{items.map((i) => <li>{i}</li>)}</>").unwrap());
    assert!(code.contains("h(Fragment,null,[items.map("), "{}", code);
    assert!(code.contains(r#"h("li",null,[i])"#), "{}", code);
}

#[test]
fn test_boolean_and_spread_attributes() {
    let code = squash(&to_executable("<input disabled {...rest} />").unwrap());
    assert!(code.contains(r#"h("input",{disabled:true,...rest},null)"#), "{}", code);
}

#[test]
fn test_type_only_syntax_is_erased() {
    let code = to_executable(
        "interface Props { label: string }\ntype Id = number;\nconst n = (value as number)!;\nn satisfies number;",
    )
    .unwrap();
    assert!(!code.contains("interface"));
    assert!(!code.contains("type Id"));
    assert!(!code.contains(" as "));
    assert!(!code.contains("satisfies"));
    assert!(code.contains("const n"));
}

#[test]
fn test_conversion_failure_is_a_syntax_error() {
    let err = to_executable("<div>").unwrap_err();
    assert!(matches!(err, EvalError::Syntax(_)));
}
