//! Serialization of configuration trees into the files an Erlang node reads.
//!
//! `app.config` uses Erlang term syntax: each mapping level is a list of
//! `{key, value}` tuples, one per line, indented four spaces per level, and
//! the document ends with a full stop. `vm.args` is one `key value` pair per
//! line.

use crate::value::{ConfigMap, ConfigValue};

const INDENT: &str = "    ";

/// Render a full `app.config` document.
pub fn render_app_config(config: &ConfigMap) -> String {
    let mut out = render_map(config, 1);
    out.push('.');
    out
}

/// Render one mapping as an Erlang proplist at the given depth.
///
/// Entries are indented `depth` levels, the closing bracket one level less.
pub fn render_map(map: &ConfigMap, depth: usize) -> String {
    if map.is_empty() {
        return "[]".to_string();
    }

    let padding = INDENT.repeat(depth);
    let entries: Vec<String> = map
        .iter()
        .map(|(key, value)| format!("{{{key}, {}}}", render_value(value, depth)))
        .collect();

    format!(
        "[\n{padding}{}\n{}]",
        entries.join(&format!(",\n{padding}")),
        INDENT.repeat(depth.saturating_sub(1))
    )
}

fn render_value(value: &ConfigValue, depth: usize) -> String {
    match value {
        ConfigValue::Str(s) => quote(s),
        ConfigValue::Atom(a) => a.clone(),
        ConfigValue::Int(i) => i.to_string(),
        ConfigValue::Float(f) => render_float(*f),
        ConfigValue::Bool(b) => b.to_string(),
        ConfigValue::Map(m) => render_map(m, depth + 1),
    }
}

/// Float literal the Erlang term reader accepts: the mantissa always
/// carries a decimal point, also in exponent form (`1.0e20`).
fn render_float(f: f64) -> String {
    let text = format!("{f:?}");
    match text.split_once('e') {
        Some((mantissa, exp)) if !mantissa.contains('.') => format!("{mantissa}.0e{exp}"),
        _ => text,
    }
}

fn quote(s: &str) -> String {
    let mut out = String::with_capacity(s.len() + 2);
    out.push('"');
    for c in s.chars() {
        if c == '"' || c == '\\' {
            out.push('\\');
        }
        out.push(c);
    }
    out.push('"');
    out
}

/// Render `vm.args`: one `key value` line per entry, values unquoted.
pub fn render_vm_args(args: &ConfigMap) -> String {
    let mut out = String::new();
    for (key, value) in args.iter() {
        out.push_str(key);
        out.push(' ');
        out.push_str(&render_flag(value));
        out.push('\n');
    }
    out
}

fn render_flag(value: &ConfigValue) -> String {
    match value {
        ConfigValue::Str(s) | ConfigValue::Atom(s) => s.clone(),
        ConfigValue::Int(i) => i.to_string(),
        ConfigValue::Float(f) => render_float(*f),
        ConfigValue::Bool(b) => b.to_string(),
        // rejected by ServerOptions::build
        ConfigValue::Map(m) => render_map(m, 1),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_nested_exact() {
        let config = ConfigMap::new()
            .with("a", 1)
            .with("b", ConfigMap::new().with("c", "x"));
        assert_eq!(
            render_map(&config, 1),
            "[\n    {a, 1},\n    {b, [\n        {c, \"x\"}\n    ]}\n]"
        );
    }

    #[test]
    fn test_app_config_terminated() {
        let config = ConfigMap::new().with(
            "riak_kv",
            ConfigMap::new()
                .with("storage_backend", ConfigValue::atom("riak_kv_test_backend"))
                .with("riak_kv_stat", true)
                .with("ratio", 0.5),
        );
        assert_eq!(
            render_app_config(&config),
            "[\n    {riak_kv, [\n        {storage_backend, riak_kv_test_backend},\n        \
             {riak_kv_stat, true},\n        {ratio, 0.5}\n    ]}\n]."
        );
    }

    #[test]
    fn test_scalar_forms() {
        assert_eq!(render_value(&ConfigValue::Float(8.0), 1), "8.0");
        assert_eq!(render_value(&ConfigValue::Int(-3), 1), "-3");
        assert_eq!(render_value(&ConfigValue::from(r#"a"b\c"#), 1), r#""a\"b\\c""#);
    }

    #[test]
    fn test_float_exponent_forms() {
        assert_eq!(render_float(1e20), "1.0e20");
        assert_eq!(render_float(1e-7), "1.0e-7");
        assert_eq!(render_float(2.5e-9), "2.5e-9");
        assert_eq!(render_float(-3e25), "-3.0e25");
        assert_eq!(render_float(0.001), "0.001");

        let config = ConfigMap::new().with(
            "a",
            ConfigMap::new().with("big", 1e20).with("tiny", 1e-7),
        );
        assert_eq!(
            render_app_config(&config),
            "[\n    {a, [\n        {big, 1.0e20},\n        {tiny, 1.0e-7}\n    ]}\n]."
        );
        let args = ConfigMap::new().with("+zdbbl", 1e20);
        assert_eq!(render_vm_args(&args), "+zdbbl 1.0e20\n");
    }

    #[test]
    fn test_empty_map() {
        assert_eq!(render_app_config(&ConfigMap::new()), "[].");
        let config = ConfigMap::new().with("luwak", ConfigMap::new());
        assert_eq!(render_map(&config, 1), "[\n    {luwak, []}\n]");
    }

    #[test]
    fn test_vm_args_lines() {
        let args = ConfigMap::new()
            .with("-name", "riaktest@127.0.0.1")
            .with("+K", true)
            .with("+A", 64)
            .with("-env ERL_MAX_PORTS", 4096);
        assert_eq!(
            render_vm_args(&args),
            "-name riaktest@127.0.0.1\n+K true\n+A 64\n-env ERL_MAX_PORTS 4096\n"
        );
    }
}
