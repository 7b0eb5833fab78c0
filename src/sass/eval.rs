//! Expression evaluator: syntax tree to resolved CSS tree.
//!
//! The evaluator walks the parsed tree depth-first with a stack of lexical
//! scopes. Each nested rule pushes a scope that is discarded when its
//! subtree finishes; assignments bind into the innermost scope and lookups
//! walk the parent chain, innermost wins. Mixins live in the same scopes
//! under their own namespace.
//!
//! Selector nesting resolves here: a child rule's alternatives combine with
//! every parent alternative (Cartesian, parent-major). A child containing
//! `&` substitutes the parent at each occurrence instead of prefixing.
//!
//! A rule is emitted before its children, and only when it holds at least
//! one declaration; rules whose only content is nested rules leave no trace
//! in the output, and their children shift one indentation level up.
//!
//! `@media` blocks bubble: rules evaluated inside them keep the enclosing
//! selector context, and a media block nested in another combines the query
//! strings with ` and `.

use std::collections::HashMap;

use once_cell::sync::Lazy;
use regex::Regex;

use crate::sass::ast::{
    BinOp, Expr, ForDirective, IfDirective, Item, MediaRule, MixinCall, MixinDefinition, RawExpr,
    Rule, Stylesheet,
};
use crate::sass::css::{CssDecl, CssDocument, CssItem, CssMedia, CssRule};
use crate::sass::error::{CompileError, Result};
use crate::sass::location::{FileTable, SourceLocation};
use crate::sass::options::CompileOptions;
use crate::sass::parsing::parse_expression;
use crate::sass::value::{named_color, Value};

static WHITESPACE_RUN: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").unwrap());

/// Collapse whitespace runs in selector and media-query text captured from
/// source, which may span lines.
fn normalize_ws(text: &str) -> String {
    WHITESPACE_RUN.replace_all(text.trim(), " ").into_owned()
}

/// Evaluate a parsed stylesheet into an inert CSS document.
///
/// The environment created here lives exactly as long as this call; nothing
/// is shared with other compilations.
pub fn evaluate(
    sheet: &Stylesheet,
    files: &FileTable,
    options: &CompileOptions,
) -> Result<CssDocument> {
    let mut evaluator = Evaluator {
        files,
        options,
        env: Environment::new(),
    };
    let mut items = Vec::new();
    let ctx = Ctx {
        selectors: Vec::new(),
        depth: 0,
        media: None,
    };
    evaluator.eval_items(&sheet.items, &ctx, None, &mut items)?;
    Ok(CssDocument { items })
}

/// One lexical scope: variables and mixins share the scope but not the
/// namespace.
#[derive(Default)]
struct Scope {
    vars: HashMap<String, Value>,
    mixins: HashMap<String, MixinDefinition>,
}

/// The scope stack. Created per compilation, never shared.
struct Environment {
    scopes: Vec<Scope>,
}

impl Environment {
    fn new() -> Self {
        Self {
            scopes: vec![Scope::default()],
        }
    }

    fn push_scope(&mut self) {
        self.scopes.push(Scope::default());
    }

    fn pop_scope(&mut self) {
        debug_assert!(self.scopes.len() > 1, "cannot pop the root scope");
        self.scopes.pop();
    }

    fn lookup(&self, name: &str) -> Option<&Value> {
        self.scopes.iter().rev().find_map(|s| s.vars.get(name))
    }

    fn define(&mut self, name: String, value: Value) {
        self.scopes
            .last_mut()
            .expect("scope stack is never empty")
            .vars
            .insert(name, value);
    }

    fn lookup_mixin(&self, name: &str) -> Option<&MixinDefinition> {
        self.scopes.iter().rev().find_map(|s| s.mixins.get(name))
    }

    fn define_mixin(&mut self, def: MixinDefinition) {
        self.scopes
            .last_mut()
            .expect("scope stack is never empty")
            .mixins
            .insert(def.name.clone(), def);
    }
}

/// Where in the tree we are: resolved parent selectors, emitted-rule depth,
/// and the enclosing media query if any.
#[derive(Clone)]
struct Ctx {
    selectors: Vec<String>,
    depth: usize,
    media: Option<String>,
}

struct Evaluator<'a> {
    files: &'a FileTable,
    options: &'a CompileOptions,
    env: Environment,
}

impl<'a> Evaluator<'a> {
    fn file_name(&self, location: SourceLocation) -> &str {
        self.files.path(location.file)
    }

    fn eval_err(&self, location: SourceLocation, message: impl Into<String>) -> CompileError {
        CompileError::eval(self.file_name(location), location.position, message)
    }

    fn eval_items(
        &mut self,
        items: &[Item],
        ctx: &Ctx,
        mut decls: Option<&mut Vec<CssDecl>>,
        out: &mut Vec<CssItem>,
    ) -> Result<()> {
        for item in items {
            match item {
                Item::Declaration(decl) => match decls.as_deref_mut() {
                    Some(sink) => sink.push(self.eval_declaration(decl)?),
                    None => {
                        return Err(self.eval_err(
                            decl.location,
                            "declarations may only appear inside a rule",
                        ));
                    }
                },
                Item::Rule(rule) => self.eval_rule(rule, ctx, out)?,
                Item::VariableAssignment(assign) => {
                    if assign.default && self.env.lookup(&assign.name).is_some() {
                        continue;
                    }
                    let value = self.eval_raw(&assign.value)?;
                    self.env.define(assign.name.clone(), value);
                }
                Item::MixinDefinition(def) => self.env.define_mixin(def.clone()),
                Item::MixinCall(call) => {
                    self.eval_mixin_call(call, ctx, decls.as_deref_mut(), out)?;
                }
                Item::If(directive) => {
                    self.eval_if(directive, ctx, decls.as_deref_mut(), out)?;
                }
                Item::For(directive) => {
                    self.eval_for(directive, ctx, decls.as_deref_mut(), out)?;
                }
                Item::Media(media) => self.eval_media(media, ctx, out)?,
                Item::CssImport(import) => out.push(CssItem::Import {
                    target: import.target.clone(),
                    location: import.location,
                }),
                Item::Comment(comment) => {
                    // Comments between declarations are dropped; top-level
                    // and media-level ones are preserved.
                    if decls.is_none() {
                        out.push(CssItem::Comment {
                            text: comment.text.clone(),
                            location: comment.location,
                        });
                    }
                }
            }
        }
        Ok(())
    }

    fn eval_rule(&mut self, rule: &Rule, ctx: &Ctx, out: &mut Vec<CssItem>) -> Result<()> {
        let resolved = self.resolve_selectors(&rule.selectors, &ctx.selectors, rule.location)?;

        self.env.push_scope();
        let mut css_rule = CssRule {
            selectors: resolved.clone(),
            depth: ctx.depth,
            decls: Vec::new(),
            location: rule.location,
        };
        let mut children = Vec::new();
        let child_ctx = Ctx {
            selectors: resolved,
            depth: ctx.depth + 1,
            media: ctx.media.clone(),
        };
        let result = self.eval_items(&rule.body, &child_ctx, Some(&mut css_rule.decls), &mut children);
        self.env.pop_scope();
        result?;

        if css_rule.decls.is_empty() {
            // The rule leaves no trace; its children move up one level.
            for item in &mut children {
                if let CssItem::Rule(child) = item {
                    child.depth = child.depth.saturating_sub(1);
                }
            }
        } else {
            out.push(CssItem::Rule(css_rule));
        }
        out.extend(children);
        Ok(())
    }

    /// Cartesian combination, parent-major: `a, b { c, d }` resolves to
    /// `a c, a d, b c, b d`.
    fn resolve_selectors(
        &mut self,
        child_alternatives: &[String],
        parents: &[String],
        location: SourceLocation,
    ) -> Result<Vec<String>> {
        let mut children = Vec::with_capacity(child_alternatives.len());
        for alt in child_alternatives {
            children.push(normalize_ws(&self.interpolate(alt, location)?));
        }

        if parents.is_empty() {
            for child in &children {
                if child.contains('&') {
                    return Err(self.eval_err(
                        location,
                        "'&' may only be used within a nested rule",
                    ));
                }
            }
            return Ok(children);
        }

        let mut resolved = Vec::with_capacity(parents.len() * children.len());
        for parent in parents {
            for child in &children {
                if child.contains('&') {
                    resolved.push(child.replace('&', parent));
                } else {
                    resolved.push(format!("{parent} {child}"));
                }
            }
        }
        Ok(resolved)
    }

    fn eval_declaration(&mut self, decl: &crate::sass::ast::Declaration) -> Result<CssDecl> {
        let property = self.interpolate(&decl.property, decl.location)?;
        let value = self.eval_raw(&decl.value)?;
        Ok(CssDecl {
            property,
            value: value.to_css(self.options.precision),
            important: decl.important,
            location: decl.location,
        })
    }

    fn eval_mixin_call(
        &mut self,
        call: &MixinCall,
        ctx: &Ctx,
        decls: Option<&mut Vec<CssDecl>>,
        out: &mut Vec<CssItem>,
    ) -> Result<()> {
        let Some(def) = self.env.lookup_mixin(&call.name).cloned() else {
            return Err(CompileError::UndefinedMixin {
                name: call.name.clone(),
                file: self.file_name(call.location).to_string(),
                position: call.location.position,
            });
        };
        if call.args.len() > def.params.len() {
            return Err(self.eval_err(
                call.location,
                format!(
                    "mixin '{}' takes {} arguments but {} were passed",
                    def.name,
                    def.params.len(),
                    call.args.len()
                ),
            ));
        }

        // Arguments evaluate in the caller's scope, before the mixin scope
        // exists; defaults evaluate inside it and can see earlier params.
        let mut arg_values = Vec::with_capacity(call.args.len());
        for arg in &call.args {
            arg_values.push(self.eval_raw(arg)?);
        }

        self.env.push_scope();
        let result = (|| {
            for (i, param) in def.params.iter().enumerate() {
                let value = match arg_values.get(i) {
                    Some(value) => value.clone(),
                    None => match &param.default {
                        Some(default) => self.eval_raw(default)?,
                        None => {
                            return Err(self.eval_err(
                                call.location,
                                format!(
                                    "mixin '{}' is missing argument ${}",
                                    def.name, param.name
                                ),
                            ));
                        }
                    },
                };
                self.env.define(param.name.clone(), value);
            }
            self.eval_items(&def.body, ctx, decls, out)
        })();
        self.env.pop_scope();
        result
    }

    fn eval_if(
        &mut self,
        directive: &IfDirective,
        ctx: &Ctx,
        decls: Option<&mut Vec<CssDecl>>,
        out: &mut Vec<CssItem>,
    ) -> Result<()> {
        let condition = self.eval_raw(&directive.condition)?;
        if condition.is_truthy() {
            self.eval_items(&directive.then_body, ctx, decls, out)
        } else if let Some(else_body) = &directive.else_body {
            self.eval_items(else_body, ctx, decls, out)
        } else {
            Ok(())
        }
    }

    fn eval_for(
        &mut self,
        directive: &ForDirective,
        ctx: &Ctx,
        mut decls: Option<&mut Vec<CssDecl>>,
        out: &mut Vec<CssItem>,
    ) -> Result<()> {
        let from = self.int_bound(&directive.from)?;
        let to = self.int_bound(&directive.to)?;
        let upper = if directive.inclusive { to + 1 } else { to };

        self.env.push_scope();
        let result = (|| {
            for i in from..upper {
                self.env
                    .define(directive.variable.clone(), Value::number(i as f64));
                self.eval_items(&directive.body, ctx, decls.as_deref_mut(), out)?;
            }
            Ok(())
        })();
        self.env.pop_scope();
        result
    }

    fn int_bound(&mut self, raw: &RawExpr) -> Result<i64> {
        match self.eval_raw(raw)? {
            Value::Number { value, unit } if unit.is_empty() && value.fract() == 0.0 => {
                Ok(value as i64)
            }
            other => Err(self.eval_err(
                raw.location,
                format!(
                    "@for bounds must be unitless integers, got '{}'",
                    other.to_css(self.options.precision)
                ),
            )),
        }
    }

    fn eval_media(&mut self, media: &MediaRule, ctx: &Ctx, out: &mut Vec<CssItem>) -> Result<()> {
        let query = normalize_ws(&self.interpolate(&media.query, media.location)?);
        let full_query = match &ctx.media {
            Some(outer) => format!("{outer} and {query}"),
            None => query,
        };

        let mut inner = Vec::new();
        if ctx.selectors.is_empty() {
            let inner_ctx = Ctx {
                selectors: Vec::new(),
                depth: 0,
                media: Some(full_query.clone()),
            };
            self.eval_items(&media.body, &inner_ctx, None, &mut inner)?;
        } else {
            // Bubbling: the enclosing rule's selectors wrap the media body.
            let mut synthesized = CssRule {
                selectors: ctx.selectors.clone(),
                depth: 0,
                decls: Vec::new(),
                location: media.location,
            };
            let mut children = Vec::new();
            let inner_ctx = Ctx {
                selectors: ctx.selectors.clone(),
                depth: 1,
                media: Some(full_query.clone()),
            };
            self.eval_items(
                &media.body,
                &inner_ctx,
                Some(&mut synthesized.decls),
                &mut children,
            )?;
            if synthesized.decls.is_empty() {
                for item in &mut children {
                    if let CssItem::Rule(child) = item {
                        child.depth = child.depth.saturating_sub(1);
                    }
                }
            } else {
                inner.push(CssItem::Rule(synthesized));
            }
            inner.extend(children);
        }

        out.push(CssItem::Media(CssMedia {
            query: full_query,
            items: inner,
            location: media.location,
        }));
        Ok(())
    }

    /// Interpolate, parse, and evaluate a raw expression slice.
    fn eval_raw(&mut self, raw: &RawExpr) -> Result<Value> {
        let text = self.interpolate(&raw.text, raw.location)?;
        let file_name = self.file_name(raw.location).to_string();
        let expr = parse_expression(&text, &file_name, raw.location)?;
        self.eval_expr(&expr, raw.location)
    }

    /// Substitute every `#{...}` in `text` with its evaluated result.
    /// Handles nesting; a `\#{` stays literal.
    fn interpolate(&mut self, text: &str, location: SourceLocation) -> Result<String> {
        if !text.contains("#{") {
            return Ok(text.to_string());
        }
        let bytes = text.as_bytes();
        let mut out = String::new();
        let mut segment_start = 0usize;
        let mut i = 0usize;
        while i < bytes.len() {
            let opens = bytes[i] == b'#'
                && i + 1 < bytes.len()
                && bytes[i + 1] == b'{'
                && (i == 0 || bytes[i - 1] != b'\\');
            if !opens {
                i += 1;
                continue;
            }
            let mut depth = 1usize;
            let mut j = i + 2;
            while j < bytes.len() && depth > 0 {
                match bytes[j] {
                    b'{' => depth += 1,
                    b'}' => depth -= 1,
                    _ => {}
                }
                j += 1;
            }
            if depth != 0 {
                return Err(CompileError::syntax(
                    self.file_name(location),
                    location.position,
                    "unterminated '#{' interpolation",
                ));
            }
            out.push_str(&text[segment_start..i]);
            let inner = &text[i + 2..j - 1];
            let value = self.eval_snippet(inner, location)?;
            // Interpolation unquotes: #{"a"} splices a, not "a".
            match value {
                Value::Str { text, .. } => out.push_str(&text),
                other => out.push_str(&other.to_css(self.options.precision)),
            }
            segment_start = j;
            i = j;
        }
        out.push_str(&text[segment_start..]);
        Ok(out)
    }

    fn eval_snippet(&mut self, snippet: &str, location: SourceLocation) -> Result<Value> {
        let interpolated = self.interpolate(snippet, location)?;
        let file_name = self.file_name(location).to_string();
        let expr = parse_expression(&interpolated, &file_name, location)?;
        self.eval_expr(&expr, location)
    }

    fn eval_expr(&mut self, expr: &Expr, location: SourceLocation) -> Result<Value> {
        self.eval_expr_in(expr, location, false)
    }

    /// `force_div` is set once evaluation has entered parentheses: inside
    /// them `/` always divides, even between two plain literals.
    fn eval_expr_in(&mut self, expr: &Expr, location: SourceLocation, force_div: bool) -> Result<Value> {
        match expr {
            Expr::Number { value, unit } => Ok(Value::Number {
                value: *value,
                unit: unit.clone(),
            }),
            Expr::Color { r, g, b, a } => Ok(Value::Color {
                r: *r,
                g: *g,
                b: *b,
                a: *a,
            }),
            Expr::Str { text, quoted } => Ok(Value::Str {
                text: text.clone(),
                quoted: *quoted,
            }),
            Expr::Ident(name) => match name.as_str() {
                "true" => Ok(Value::Bool(true)),
                "false" => Ok(Value::Bool(false)),
                _ => Ok(Value::unquoted(name.clone())),
            },
            Expr::Variable { name } => match self.env.lookup(name) {
                Some(value) => Ok(value.clone()),
                None => Err(CompileError::UndefinedVariable {
                    name: name.clone(),
                    file: self.file_name(location).to_string(),
                    position: location.position,
                }),
            },
            Expr::List { items, comma } => {
                let mut values = Vec::with_capacity(items.len());
                for item in items {
                    values.push(self.eval_expr_in(item, location, force_div)?);
                }
                Ok(Value::List {
                    items: values,
                    comma: *comma,
                })
            }
            Expr::Neg(inner) => match self.eval_expr_in(inner, location, force_div)? {
                Value::Number { value, unit } => Ok(Value::Number {
                    value: -value,
                    unit,
                }),
                other => Err(self.eval_err(
                    location,
                    format!("cannot negate {}", other.to_css(self.options.precision)),
                )),
            },
            Expr::Paren(inner) => self.eval_expr_in(inner, location, true),
            Expr::BinOp { op, lhs, rhs } => self.eval_binop(*op, lhs, rhs, location, force_div),
            Expr::FunctionCall { name, args } => self.eval_call(name, args, location),
            Expr::Raw(text) => Ok(Value::unquoted(text.clone())),
        }
    }

    fn eval_binop(
        &mut self,
        op: BinOp,
        lhs: &Expr,
        rhs: &Expr,
        location: SourceLocation,
        force_div: bool,
    ) -> Result<Value> {
        // `/` between two plain literals is CSS shorthand, not division:
        // `font: 10px/8px` survives, `$x/2` and `(10px/2)` divide.
        if op == BinOp::Div && !force_div && !lhs.is_computed() && !rhs.is_computed() {
            let left = self.eval_expr(lhs, location)?;
            let right = self.eval_expr(rhs, location)?;
            let precision = self.options.precision;
            return Ok(Value::unquoted(format!(
                "{}/{}",
                left.to_css(precision),
                right.to_css(precision)
            )));
        }

        let left = self.eval_expr_in(lhs, location, force_div)?;
        let right = self.eval_expr_in(rhs, location, force_div)?;
        let result = match op {
            BinOp::Add => left.add(&right),
            BinOp::Sub => left.sub(&right),
            BinOp::Mul => left.mul(&right),
            BinOp::Div => left.div(&right),
            BinOp::Mod => left.rem(&right),
            BinOp::Eq => return Ok(Value::Bool(left.loose_eq(&right))),
            BinOp::Ne => return Ok(Value::Bool(!left.loose_eq(&right))),
            BinOp::Lt | BinOp::Le | BinOp::Gt | BinOp::Ge => {
                let ordering = left
                    .compare(&right)
                    .map_err(|message| self.eval_err(location, message))?;
                let holds = match op {
                    BinOp::Lt => ordering == std::cmp::Ordering::Less,
                    BinOp::Le => ordering != std::cmp::Ordering::Greater,
                    BinOp::Gt => ordering == std::cmp::Ordering::Greater,
                    BinOp::Ge => ordering != std::cmp::Ordering::Less,
                    _ => unreachable!(),
                };
                return Ok(Value::Bool(holds));
            }
        };
        result.map_err(|message| self.eval_err(location, message))
    }

    fn eval_call(&mut self, name: &str, args: &[Expr], location: SourceLocation) -> Result<Value> {
        match name {
            "and" | "or" | "not" => self.eval_logical(name, args, location),
            "rgb" => {
                let channels = self.color_channels(args, location, 3)?;
                Ok(Value::Color {
                    r: channels[0],
                    g: channels[1],
                    b: channels[2],
                    a: 1.0,
                })
            }
            "rgba" => self.eval_rgba(args, location),
            "image-url" => self.eval_image_url(args, location),
            _ => {
                // Unknown functions re-emit as plain CSS with evaluated
                // arguments, so vendor functions keep working.
                let mut rendered = Vec::with_capacity(args.len());
                for arg in args {
                    let value = self.eval_expr(arg, location)?;
                    rendered.push(value.to_css(self.options.precision));
                }
                Ok(Value::unquoted(format!("{name}({})", rendered.join(", "))))
            }
        }
    }

    fn eval_logical(&mut self, name: &str, args: &[Expr], location: SourceLocation) -> Result<Value> {
        match name {
            "not" => {
                let value = self.eval_expr(&args[0], location)?;
                Ok(Value::Bool(!value.is_truthy()))
            }
            "and" => {
                let left = self.eval_expr(&args[0], location)?;
                if !left.is_truthy() {
                    return Ok(left);
                }
                self.eval_expr(&args[1], location)
            }
            "or" => {
                let left = self.eval_expr(&args[0], location)?;
                if left.is_truthy() {
                    return Ok(left);
                }
                self.eval_expr(&args[1], location)
            }
            _ => unreachable!("checked by caller"),
        }
    }

    fn eval_rgba(&mut self, args: &[Expr], location: SourceLocation) -> Result<Value> {
        match args.len() {
            4 => {
                let channels = self.color_channels(&args[..3], location, 3)?;
                let alpha = self.alpha_value(&args[3], location)?;
                Ok(Value::Color {
                    r: channels[0],
                    g: channels[1],
                    b: channels[2],
                    a: alpha,
                })
            }
            2 => {
                let base = self.eval_expr(&args[0], location)?;
                let alpha = self.alpha_value(&args[1], location)?;
                match base {
                    Value::Color { r, g, b, .. } => Ok(Value::Color { r, g, b, a: alpha }),
                    Value::Str { text, quoted: false } if named_color(&text).is_some() => {
                        let (r, g, b) = named_color(&text).unwrap();
                        Ok(Value::Color { r, g, b, a: alpha })
                    }
                    other => Err(self.eval_err(
                        location,
                        format!(
                            "rgba() expects a color, got '{}'",
                            other.to_css(self.options.precision)
                        ),
                    )),
                }
            }
            n => Err(self.eval_err(
                location,
                format!("rgba() takes 2 or 4 arguments, got {n}"),
            )),
        }
    }

    fn color_channels(
        &mut self,
        args: &[Expr],
        location: SourceLocation,
        expected: usize,
    ) -> Result<Vec<u8>> {
        if args.len() != expected {
            return Err(self.eval_err(
                location,
                format!("expected {expected} color channels, got {}", args.len()),
            ));
        }
        let mut channels = Vec::with_capacity(expected);
        for arg in args {
            let channel = match self.eval_expr(arg, location)? {
                Value::Number { value, unit } if unit.is_empty() => value,
                Value::Number { value, unit } if unit == "%" => value * 255.0 / 100.0,
                other => {
                    return Err(self.eval_err(
                        location,
                        format!(
                            "color channels must be numbers, got '{}'",
                            other.to_css(self.options.precision)
                        ),
                    ));
                }
            };
            channels.push(channel.round().clamp(0.0, 255.0) as u8);
        }
        Ok(channels)
    }

    fn alpha_value(&mut self, arg: &Expr, location: SourceLocation) -> Result<f64> {
        match self.eval_expr(arg, location)? {
            Value::Number { value, unit } if unit.is_empty() => Ok(value.clamp(0.0, 1.0)),
            other => Err(self.eval_err(
                location,
                format!(
                    "alpha must be a unitless number, got '{}'",
                    other.to_css(self.options.precision)
                ),
            )),
        }
    }

    /// `image-url("logo.png")` joins the configured image path:
    /// `url("<image_path>/logo.png")`.
    fn eval_image_url(&mut self, args: &[Expr], location: SourceLocation) -> Result<Value> {
        if args.len() != 1 {
            return Err(self.eval_err(
                location,
                format!("image-url() takes 1 argument, got {}", args.len()),
            ));
        }
        let name = match self.eval_expr(&args[0], location)? {
            Value::Str { text, .. } => text,
            other => {
                return Err(self.eval_err(
                    location,
                    format!(
                        "image-url() expects a path string, got '{}'",
                        other.to_css(self.options.precision)
                    ),
                ));
            }
        };
        let base = self.options.image_path.display().to_string().replace('\\', "/");
        let joined = if base.is_empty() || base == "." {
            name
        } else {
            format!("{}/{}", base.trim_end_matches('/'), name)
        };
        Ok(Value::unquoted(format!("url(\"{joined}\")")))
    }
}
