// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! Structured JavaScript code generation.
//!
//! Generated modules are assembled from [`Stmt`] and [`Expr`] values instead of textual
//! placeholder substitution. Every string that originates from configuration is emitted
//! through [`Expr::Str`], which is JSON-escaped, so a module name containing quotes or
//! line terminators cannot break out of its literal.
//!
//! Fixed runtime logic that does not depend on configuration is carried as
//! [`Stmt::Raw`] text.

use std::fmt::{self, Write};

/// A JavaScript expression
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    /// `null`
    Null,
    /// `true` / `false`
    Bool(bool),
    /// Integer literal
    Int(i64),
    /// String literal (escaped)
    Str(String),
    /// Identifier or member path such as `globalThis.__FEDERATION__`
    Ident(String),
    /// `[a, b]`
    Array(Vec<Expr>),
    /// `{ key: value }`
    Object(Vec<(String, Expr)>),
    /// `callee(args)`
    Call(Box<Expr>, Vec<Expr>),
    /// `object[key]`
    Index(Box<Expr>, Box<Expr>),
    /// `object.property`
    Member(Box<Expr>, String),
    /// `(params) => body`
    Arrow {
        /// Parameter names
        params: Vec<String>,
        /// Body expression
        body: Box<Expr>,
        /// `async` arrow
        is_async: bool,
    },
    /// `import(specifier)`
    DynamicImport(String),
    /// `require(specifier)`
    Require(String),
    /// `await expr`
    Await(Box<Expr>),
    /// `target=value`
    Assign(Box<Expr>, Box<Expr>),
    /// `a,b`
    Sequence(Vec<Expr>),
}

impl Expr {
    /// String literal
    pub fn str(value: impl Into<String>) -> Self {
        Expr::Str(value.into())
    }

    /// Identifier
    pub fn ident(name: impl Into<String>) -> Self {
        Expr::Ident(name.into())
    }

    /// Array of string literals
    pub fn str_array<I, S>(items: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Expr::Array(items.into_iter().map(|s| Expr::Str(s.into())).collect())
    }

    /// Optional string, `undefined` when absent
    pub fn opt_str(value: Option<&str>) -> Self {
        match value {
            Some(value) => Expr::str(value),
            None => Expr::ident("undefined"),
        }
    }

    /// Call expression
    pub fn call(callee: Expr, args: Vec<Expr>) -> Self {
        Expr::Call(Box::new(callee), args)
    }

    /// Computed member access
    pub fn index(object: Expr, key: Expr) -> Self {
        Expr::Index(Box::new(object), Box::new(key))
    }

    /// Static member access
    pub fn member(object: Expr, property: &str) -> Self {
        Expr::Member(Box::new(object), property.to_string())
    }

    /// Assignment expression
    pub fn assign(target: Expr, value: Expr) -> Self {
        Expr::Assign(Box::new(target), Box::new(value))
    }

    /// Arrow function
    pub fn arrow(params: &[&str], body: Expr) -> Self {
        Expr::Arrow {
            params: params.iter().map(|p| p.to_string()).collect(),
            body: Box::new(body),
            is_async: false,
        }
    }

    /// Async arrow function
    pub fn async_arrow(params: &[&str], body: Expr) -> Self {
        Expr::Arrow {
            params: params.iter().map(|p| p.to_string()).collect(),
            body: Box::new(body),
            is_async: true,
        }
    }
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expr::Null => f.write_str("null"),
            Expr::Bool(b) => write!(f, "{}", b),
            Expr::Int(n) => write!(f, "{}", n),
            Expr::Str(s) => f.write_str(&quote(s)),
            Expr::Ident(name) => f.write_str(name),
            Expr::Array(items) => {
                f.write_char('[')?;
                write_list(f, items)?;
                f.write_char(']')
            }
            Expr::Object(entries) => {
                if entries.is_empty() {
                    return f.write_str("{}");
                }
                f.write_str("{ ")?;
                for (i, (key, value)) in entries.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{}: {}", property_key(key), value)?;
                }
                f.write_str(" }")
            }
            Expr::Call(callee, args) => {
                match callee.as_ref() {
                    Expr::Arrow { .. } => write!(f, "({})", callee)?,
                    _ => write!(f, "{}", callee)?,
                }
                f.write_char('(')?;
                write_list(f, args)?;
                f.write_char(')')
            }
            Expr::Index(object, key) => write!(f, "{}[{}]", object, key),
            Expr::Member(object, property) => write!(f, "{}.{}", object, property),
            Expr::Arrow {
                params,
                body,
                is_async,
            } => {
                if *is_async {
                    f.write_str("async ")?;
                }
                write!(f, "({}) => ", params.join(", "))?;
                match body.as_ref() {
                    // object literals need parens to not parse as a block
                    Expr::Object(_) => write!(f, "({})", body),
                    _ => write!(f, "{}", body),
                }
            }
            Expr::DynamicImport(specifier) => write!(f, "import({})", quote(specifier)),
            Expr::Require(specifier) => write!(f, "require({})", quote(specifier)),
            Expr::Await(inner) => write!(f, "await {}", inner),
            Expr::Assign(target, value) => write!(f, "{}={}", target, value),
            Expr::Sequence(items) => {
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        f.write_char(',')?;
                    }
                    write!(f, "{}", item)?;
                }
                Ok(())
            }
        }
    }
}

fn write_list(f: &mut fmt::Formatter<'_>, items: &[Expr]) -> fmt::Result {
    for (i, item) in items.iter().enumerate() {
        if i > 0 {
            f.write_str(", ")?;
        }
        write!(f, "{}", item)?;
    }
    Ok(())
}

/// A JavaScript statement
#[derive(Debug, Clone, PartialEq)]
pub enum Stmt {
    /// `import "source";`
    ImportSideEffect(String),
    /// `import local from "source";`
    ImportDefault {
        /// Local binding
        local: String,
        /// Module specifier
        source: String,
    },
    /// `import { a, b } from "source";`
    ImportNamed {
        /// Imported bindings
        names: Vec<String>,
        /// Module specifier
        source: String,
    },
    /// `const name = value;`
    Const(String, Expr),
    /// `var name = value;`
    Var(String, Expr),
    /// `target = value;`
    Assign(Expr, Expr),
    /// `target ??= value;`
    AssignDefault(Expr, Expr),
    /// `expr;`
    Expr(Expr),
    /// `module.exports = value;`
    ModuleExports(Expr),
    /// Fixed code that carries no configuration-derived values
    Raw(String),
}

impl fmt::Display for Stmt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Stmt::ImportSideEffect(source) => write!(f, "import {};", quote(source)),
            Stmt::ImportDefault { local, source } => {
                write!(f, "import {} from {};", local, quote(source))
            }
            Stmt::ImportNamed { names, source } => {
                write!(f, "import {{ {} }} from {};", names.join(", "), quote(source))
            }
            Stmt::Const(name, value) => write!(f, "const {} = {};", name, value),
            Stmt::Var(name, value) => write!(f, "var {}={};", name, value),
            Stmt::Assign(target, value) => write!(f, "{} = {};", target, value),
            Stmt::AssignDefault(target, value) => write!(f, "{} ??= {};", target, value),
            Stmt::Expr(expr) => write!(f, "{};", expr),
            Stmt::ModuleExports(value) => write!(f, "module.exports = {};", value),
            Stmt::Raw(code) => f.write_str(code.trim_end()),
        }
    }
}

/// A generated module: an ordered list of statements
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ModuleBuilder {
    body: Vec<Stmt>,
}

impl ModuleBuilder {
    /// Create an empty module
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a statement
    pub fn push(&mut self, stmt: Stmt) -> &mut Self {
        self.body.push(stmt);
        self
    }

    /// Append several statements
    pub fn extend(&mut self, stmts: impl IntoIterator<Item = Stmt>) -> &mut Self {
        self.body.extend(stmts);
        self
    }

    /// Append fixed code
    pub fn raw(&mut self, code: &str) -> &mut Self {
        self.body.push(Stmt::Raw(code.to_string()));
        self
    }

    /// Statements in order
    pub fn statements(&self) -> &[Stmt] {
        &self.body
    }

    /// Render to source text
    pub fn build(&self) -> String {
        let mut out = String::new();
        for stmt in &self.body {
            // writing into a String cannot fail
            let _ = writeln!(out, "{}", stmt);
        }
        out
    }
}

/// JSON-quote a string; JSON string syntax is a subset of JavaScript's,
/// apart from U+2028/U+2029 which are escaped explicitly.
pub fn quote(value: &str) -> String {
    let quoted = serde_json::Value::String(value.to_string()).to_string();
    quoted.replace('\u{2028}', "\\u2028").replace('\u{2029}', "\\u2029")
}

fn property_key(key: &str) -> String {
    let mut chars = key.chars();
    let is_identifier = chars
        .next()
        .is_some_and(|c| c.is_ascii_alphabetic() || c == '_' || c == '$')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '$');
    if is_identifier {
        key.to_string()
    } else {
        quote(key)
    }
}

/// Number of lines in a piece of generated code
pub fn count_lines(code: &str) -> usize {
    let mut lines = 1;
    let mut chars = code.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '\r' => {
                if chars.peek() == Some(&'\n') {
                    chars.next();
                }
                lines += 1;
            }
            '\n' | '\u{2028}' | '\u{2029}' => lines += 1,
            _ => {}
        }
    }
    lines
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_string_escaping() {
        let expr = Expr::str("a\"b\nc\u{2028}");
        assert_eq!(expr.to_string(), r#""a\"b\nc\u2028""#);
    }

    #[test]
    fn test_object_keys() {
        let expr = Expr::Object(vec![
            ("alias".into(), Expr::str("mini")),
            ("./button".into(), Expr::Bool(true)),
        ]);
        assert_eq!(expr.to_string(), r#"{ alias: "mini", "./button": true }"#);
    }

    #[test]
    fn test_arrows() {
        let sync = Expr::arrow(&[], Expr::arrow(&[], Expr::Require("lodash".into())));
        assert_eq!(sync.to_string(), r#"() => () => require("lodash")"#);

        let async_import = Expr::async_arrow(
            &[],
            Expr::call(
                Expr::member(Expr::DynamicImport("lodash".into()), "then"),
                vec![Expr::arrow(&["m"], Expr::arrow(&[], Expr::ident("m")))],
            ),
        );
        assert_eq!(
            async_import.to_string(),
            r#"async () => import("lodash").then((m) => () => m)"#
        );
    }

    #[test]
    fn test_statements() {
        let mut module = ModuleBuilder::new();
        module
            .push(Stmt::ImportNamed {
                names: vec!["init".into()],
                source: "@module-federation/runtime".into(),
            })
            .push(Stmt::Var("__EARLY_SHARED__".into(), Expr::str_array(["react"])))
            .push(Stmt::AssignDefault(
                Expr::ident("globalThis.__FEDERATION__"),
                Expr::Object(vec![]),
            ));

        assert_eq!(
            module.build(),
            "import { init } from \"@module-federation/runtime\";\n\
             var __EARLY_SHARED__=[\"react\"];\n\
             globalThis.__FEDERATION__ ??= {};\n"
        );
    }

    #[test]
    fn test_sequence_statement() {
        let stmt = Stmt::Expr(Expr::Sequence(vec![
            Expr::assign(Expr::ident("a"), Expr::str_array(["x"])),
            Expr::assign(Expr::ident("b"), Expr::Array(vec![])),
        ]));
        assert_eq!(stmt.to_string(), r#"a=["x"],b=[];"#);
    }

    #[test]
    fn test_count_lines() {
        assert_eq!(count_lines("a"), 1);
        assert_eq!(count_lines("a\nb\r\nc\rd"), 4);
    }
}
