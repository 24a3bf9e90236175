//! The scanning pass: every call in the file, checked against the allowlist.

use super::allowlist::Allowlist;
use super::diagnostic::{Category, Diagnostic};
use super::imports::RawImports;
use super::source::{render_callee, SourceMap};
use super::type_tracker::{
    is_element_closure_method, path_segments, ResolvedType, ScopeKind, TypeTracker,
};
use proc_macro2::Span;
use std::path::Path;
use syn::parse::ParseStream;
use syn::punctuated::Punctuated;
use syn::spanned::Spanned;
use syn::visit::{self, Visit};
use syn::{
    Block, Expr, ExprCall, ExprClosure, ExprForLoop, ExprIf, ExprMatch, ExprMethodCall,
    ExprWhile, FnArg, ImplItemFn, ItemFn, ItemImpl, Local, Macro, Pat, Signature, Stmt, Token,
    TraitItemFn,
};

pub(crate) struct CallVisitor<'a> {
    path: &'a Path,
    imports: &'a RawImports,
    allowlist: Allowlist,
    source: &'a SourceMap<'a>,
    tracker: TypeTracker<'a>,
    strict: bool,
    /// Recovery closures enclosing the current node
    wrapped: usize,
    /// Closures returned out of a recovery closure; they run after the
    /// recovery scope has ended
    escaping: Vec<*const ExprClosure>,
    diagnostics: Vec<Diagnostic>,
}

impl<'a> CallVisitor<'a> {
    pub(crate) fn new(
        path: &'a Path,
        imports: &'a RawImports,
        source: &'a SourceMap<'a>,
        tracker: TypeTracker<'a>,
        strict: bool,
    ) -> Self {
        Self {
            path,
            imports,
            allowlist: Allowlist::new(imports.raw_path()),
            source,
            tracker,
            strict,
            wrapped: 0,
            escaping: Vec::new(),
            diagnostics: Vec::new(),
        }
    }

    pub(crate) fn into_diagnostics(self) -> Vec<Diagnostic> {
        self.diagnostics
    }

    fn report(&mut self, at: Span, category: Category, type_name: &str, callee: &str) {
        let start = at.start();
        if self.wrapped > 0 && !self.strict {
            tracing::trace!(
                line = start.line,
                callee,
                "call inside recovery closure"
            );
            return;
        }
        self.diagnostics.push(Diagnostic {
            file: self.path.to_path_buf(),
            line: start.line,
            column: start.column + 1,
            message: category.message(type_name, callee),
            category,
        });
    }

    /// `binding::op(...)` and `binding::Type::op(...)`.
    fn check_path_call(&mut self, call: &ExprCall) {
        let Expr::Path(func) = &*call.func else {
            return;
        };
        if func.qself.is_some() {
            return;
        }
        let Some(canonical) = self.imports.canonicalize(&path_segments(&func.path)) else {
            return;
        };
        let Some((type_name, op)) = canonical.rsplit_once("::") else {
            return;
        };
        // Tuple structs and enum variants, not functions
        if op.starts_with(char::is_uppercase) || self.allowlist.is_safe(type_name, op) {
            return;
        }
        let category = if type_name == self.imports.raw_path() {
            Category::PackageCall
        } else {
            Category::AssociatedCall
        };
        let callee = render_callee(self.source, func.span(), func.span(), func);
        self.report(call.span(), category, type_name, &callee);
    }

    /// `recv.op(...)` where `recv` has a raw static type.
    fn check_method_call(&mut self, call: &ExprMethodCall) {
        let Some(receiver) = self.tracker.resolve_expr_type(&call.receiver) else {
            return;
        };
        let op = call.method.to_string();
        if self.allowlist.is_safe(&receiver.type_name, &op) {
            return;
        }
        let end = call
            .turbofish
            .as_ref()
            .map_or_else(|| call.method.span(), |turbofish| turbofish.span());
        let (recv, method) = (&call.receiver, &call.method);
        let tokens = quote::quote!(#recv.#method);
        let callee = render_callee(self.source, call.receiver.span(), end, &tokens);
        self.report(call.span(), Category::MethodCall, &receiver.type_name, &callee);
    }

    fn is_recovery_call(&self, call: &ExprCall) -> bool {
        match &*call.func {
            Expr::Path(func) if func.qself.is_none() => {
                self.imports.is_recovery_call(&path_segments(&func.path))
            }
            _ => false,
        }
    }

    fn visit_fn(&mut self, sig: &Signature, block: &Block) {
        self.tracker.enter_scope(ScopeKind::Function, None);
        for input in &sig.inputs {
            if let FnArg::Typed(param) = input {
                self.tracker.bind_pattern(&syn::Pat::Type(param.clone()), None);
            }
        }
        self.visit_block(block);
        self.tracker.exit_scope();
    }

    /// Visits a closure whose first parameter, when untyped, has type
    /// `first`.
    fn visit_closure(&mut self, closure: &ExprClosure, first: Option<ResolvedType>) {
        let escapes = self
            .escaping
            .iter()
            .any(|escaping| std::ptr::eq(*escaping, closure));
        let wrapped = if escapes {
            std::mem::take(&mut self.wrapped)
        } else {
            self.wrapped
        };

        self.tracker.enter_scope(ScopeKind::Closure, None);
        let mut first = first;
        for input in &closure.inputs {
            self.tracker.bind_resolved(input, first.take());
        }
        Visit::visit_expr(self, &closure.body);
        self.tracker.exit_scope();
        self.wrapped = wrapped;
    }

    /// A recovery closure: calls inside it are wrapped, except inside a
    /// closure it returns.
    fn visit_recovery_closure(&mut self, closure: &ExprClosure) {
        let escaping = returned_closure(&closure.body).map(|c| c as *const ExprClosure);
        if let Some(escaping) = escaping {
            self.escaping.push(escaping);
        }
        self.wrapped += 1;
        self.visit_closure(closure, None);
        self.wrapped -= 1;
        if escaping.is_some() {
            self.escaping.pop();
        }
    }

    /// Binds `pat` against `scrutinee` for the extent of `body`.
    fn visit_binding_scope(&mut self, pat: &Pat, scrutinee: &Expr, body: impl FnOnce(&mut Self)) {
        let resolved = self.tracker.resolve_expr_type(scrutinee);
        self.tracker.enter_scope(ScopeKind::Block, None);
        self.tracker.bind_resolved(pat, resolved);
        Visit::visit_pat(self, pat);
        body(self);
        self.tracker.exit_scope();
    }

    /// `matches!(expr, pat if guard)`
    fn visit_match_macro(&mut self, scrutinee: &Expr, pat: &Pat, guard: Option<&Expr>) {
        Visit::visit_expr(self, scrutinee);
        self.visit_binding_scope(pat, scrutinee, |this| {
            if let Some(guard) = guard {
                Visit::visit_expr(this, guard);
            }
        });
    }
}

fn as_closure(expr: &Expr) -> Option<&ExprClosure> {
    match expr {
        Expr::Closure(closure) => Some(closure),
        Expr::Paren(paren) => as_closure(&paren.expr),
        Expr::Group(group) => as_closure(&group.expr),
        _ => None,
    }
}

/// The closure `body` evaluates to, looking through blocks and `return`.
fn returned_closure(body: &Expr) -> Option<&ExprClosure> {
    match body {
        Expr::Closure(closure) => Some(closure),
        Expr::Paren(paren) => returned_closure(&paren.expr),
        Expr::Group(group) => returned_closure(&group.expr),
        Expr::Return(ret) => ret.expr.as_deref().and_then(returned_closure),
        Expr::Block(block) => match block.block.stmts.last() {
            Some(Stmt::Expr(tail, None)) => returned_closure(tail),
            _ => None,
        },
        _ => None,
    }
}

/// Body of `matches!`: an expression, a pattern and an optional guard.
fn parse_match_body(input: ParseStream) -> syn::Result<(Expr, Pat, Option<Expr>)> {
    let scrutinee: Expr = input.parse()?;
    input.parse::<Token![,]>()?;
    let pat = Pat::parse_multi_with_leading_vert(input)?;
    let guard = if input.peek(Token![if]) {
        input.parse::<Token![if]>()?;
        Some(input.parse()?)
    } else {
        None
    };
    input.parse::<Option<Token![,]>>()?;
    Ok((scrutinee, pat, guard))
}

impl<'ast> Visit<'ast> for CallVisitor<'_> {
    fn visit_expr_call(&mut self, call: &'ast ExprCall) {
        self.check_path_call(call);
        let recovery = self.is_recovery_call(call);
        self.visit_expr(&call.func);
        for arg in &call.args {
            match as_closure(arg) {
                Some(closure) if recovery => self.visit_recovery_closure(closure),
                _ => self.visit_expr(arg),
            }
        }
    }

    fn visit_expr_method_call(&mut self, call: &'ast ExprMethodCall) {
        self.check_method_call(call);
        self.visit_expr(&call.receiver);
        let element = if is_element_closure_method(&call.method.to_string()) {
            self.tracker
                .resolve_expr_type(&call.receiver)
                .and_then(|receiver| receiver.element())
        } else {
            None
        };
        for arg in &call.args {
            match as_closure(arg) {
                Some(closure) if element.is_some() => self.visit_closure(closure, element.clone()),
                _ => self.visit_expr(arg),
            }
        }
    }

    fn visit_expr_for_loop(&mut self, for_loop: &'ast ExprForLoop) {
        self.visit_expr(&for_loop.expr);
        let container = self.tracker.resolve_expr_type(&for_loop.expr);
        self.tracker.enter_scope(ScopeKind::Block, None);
        self.tracker.bind_element(&for_loop.pat, container);
        self.visit_pat(&for_loop.pat);
        self.visit_block(&for_loop.body);
        self.tracker.exit_scope();
    }

    fn visit_expr_if(&mut self, expr_if: &'ast ExprIf) {
        let Expr::Let(cond) = &*expr_if.cond else {
            visit::visit_expr_if(self, expr_if);
            return;
        };
        self.visit_expr(&cond.expr);
        self.visit_binding_scope(&cond.pat, &cond.expr, |this| {
            this.visit_block(&expr_if.then_branch);
        });
        if let Some((_, else_branch)) = &expr_if.else_branch {
            self.visit_expr(else_branch);
        }
    }

    fn visit_expr_while(&mut self, expr_while: &'ast ExprWhile) {
        let Expr::Let(cond) = &*expr_while.cond else {
            visit::visit_expr_while(self, expr_while);
            return;
        };
        self.visit_expr(&cond.expr);
        self.visit_binding_scope(&cond.pat, &cond.expr, |this| {
            this.visit_block(&expr_while.body);
        });
    }

    fn visit_expr_match(&mut self, expr_match: &'ast ExprMatch) {
        self.visit_expr(&expr_match.expr);
        for arm in &expr_match.arms {
            self.visit_binding_scope(&arm.pat, &expr_match.expr, |this| {
                if let Some((_, guard)) = &arm.guard {
                    this.visit_expr(guard);
                }
                this.visit_expr(&arm.body);
            });
        }
    }

    fn visit_item_fn(&mut self, item: &'ast ItemFn) {
        self.visit_fn(&item.sig, &item.block);
    }

    fn visit_impl_item_fn(&mut self, item: &'ast ImplItemFn) {
        self.visit_fn(&item.sig, &item.block);
    }

    fn visit_trait_item_fn(&mut self, item: &'ast TraitItemFn) {
        if let Some(block) = &item.default {
            self.visit_fn(&item.sig, block);
        }
    }

    fn visit_item_impl(&mut self, item: &'ast ItemImpl) {
        let impl_type = self.tracker.resolve_type(&item.self_ty);
        self.tracker.enter_scope(ScopeKind::Impl, impl_type);
        visit::visit_item_impl(self, item);
        self.tracker.exit_scope();
    }

    fn visit_block(&mut self, block: &'ast Block) {
        self.tracker.enter_scope(ScopeKind::Block, None);
        visit::visit_block(self, block);
        self.tracker.exit_scope();
    }

    fn visit_local(&mut self, local: &'ast Local) {
        if let Some(init) = &local.init {
            self.visit_expr(&init.expr);
            if let Some((_, diverge)) = &init.diverge {
                self.visit_expr(diverge);
            }
        }
        let init = local.init.as_ref().map(|init| &*init.expr);
        self.tracker.bind_pattern(&local.pat, init);
    }

    fn visit_expr_closure(&mut self, closure: &'ast ExprClosure) {
        self.visit_closure(closure, None);
    }

    /// Macro bodies are scanned when they read as comma-separated
    /// expressions (`assert!`, `format!`), as `matches!` arguments, or as
    /// statements (`vec![x; n]`, statement-bodied macros).
    fn visit_macro(&mut self, mac: &'ast Macro) {
        if let Ok(args) = mac.parse_body_with(Punctuated::<Expr, Token![,]>::parse_terminated) {
            for arg in &args {
                Visit::visit_expr(self, arg);
            }
        } else if let Ok((scrutinee, pat, guard)) = mac.parse_body_with(parse_match_body) {
            self.visit_match_macro(&scrutinee, &pat, guard.as_ref());
        } else if let Ok(stmts) = mac.parse_body_with(Block::parse_within) {
            self.tracker.enter_scope(ScopeKind::Block, None);
            for stmt in &stmts {
                Visit::visit_stmt(self, stmt);
            }
            self.tracker.exit_scope();
        } else {
            let start = mac.span().start();
            let name = mac.path.segments.last().map(|seg| seg.ident.to_string());
            tracing::debug!(
                file = %self.path.display(),
                macro_name = name.as_deref().unwrap_or_default(),
                line = start.line,
                column = start.column + 1,
                "macro body is not Rust syntax, not scanned"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scan(source: &str, strict: bool) -> Vec<String> {
        let file = syn::parse_file(source).unwrap();
        let imports = RawImports::collect(
            &file,
            "safejs::raw",
            &["attempt".to_string(), "attempt_side_effect".to_string()],
        );
        let map = SourceMap::new(source);
        let mut tracker = TypeTracker::new(&imports);
        tracker.index_items(&file.items);
        let mut visitor = CallVisitor::new(Path::new("t.rs"), &imports, &map, tracker, strict);
        visitor.visit_file(&file);
        visitor
            .into_diagnostics()
            .into_iter()
            .map(|d| format!("{}:{} {}", d.line, d.column, d.message))
            .collect()
    }

    #[test]
    fn test_wrapped_calls_are_not_reported() {
        let source = "use safejs::raw;
use safejs::catch;
fn f(v: raw::Value) {
    let _ = catch::attempt(|| v.get(\"x\"));
    v.string();
}";
        assert_eq!(
            scan(source, false),
            vec!["5:5 unsafe method call on safejs::raw::Value found: v.string(...)"]
        );
        assert_eq!(scan(source, true).len(), 2);
    }

    #[test]
    fn test_closure_stored_before_attempt_is_not_wrapped() {
        let source = "use safejs::{catch::attempt, raw};
fn f() {
    let op = || raw::value_of(1);
    let _ = attempt(op);
}";
        assert_eq!(
            scan(source, false),
            vec!["3:17 unsafe call to safejs::raw found: raw::value_of(...)"]
        );
    }

    #[test]
    fn test_associated_call_and_variant_constructor() {
        let source = "use safejs::raw;
fn f(v: raw::Value) {
    raw::Value::get(&v, \"x\");
    let _ = raw::Native::Bool(true);
}";
        assert_eq!(
            scan(source, false),
            vec!["3:5 unsafe call to safejs::raw::Value found: raw::Value::get(...)"]
        );
    }

    #[test]
    fn test_struct_field_receiver() {
        let source = "use safejs::raw;
struct Holder { value: raw::Value }
impl Holder {
    fn name(&self) -> String {
        self.value.is_null();
        self.value.string()
    }
}";
        assert_eq!(
            scan(source, false),
            vec!["6:9 unsafe method call on safejs::raw::Value found: self.value.string(...)"]
        );
    }

    #[test]
    fn test_calls_inside_macros() {
        let source = "use safejs::raw;
fn f(v: raw::Value) {
    assert_eq!(v.int(), 1);
}";
        assert_eq!(
            scan(source, false),
            vec!["3:16 unsafe method call on safejs::raw::Value found: v.int(...)"]
        );
    }

    #[test]
    fn test_shadowed_binding_is_not_a_raw_value() {
        let source = "use safejs::raw;
fn f(value: raw::Value) {
    let value = String::new();
    value.len();
}";
        assert!(scan(source, false).is_empty());
    }

    #[test]
    fn test_closure_parameter_types() {
        let source = "use safejs::raw::{self, Value as JsValue};
fn f() {
    let g = |v: &JsValue| v.truthy();
}";
        assert_eq!(
            scan(source, false),
            vec!["3:27 unsafe method call on safejs::raw::Value found: v.truthy(...)"]
        );
    }

    #[test]
    fn test_loop_variables_take_element_type() {
        let source = "use safejs::raw;
fn f(vals: Vec<raw::Value>) {
    for v in &vals {
        v.string();
    }
}";
        assert_eq!(
            scan(source, false),
            vec!["4:9 unsafe method call on safejs::raw::Value found: v.string(...)"]
        );
    }

    #[test]
    fn test_if_let_and_match_bindings() {
        let source = "use safejs::raw;
fn f(o: Option<raw::Value>) {
    if let Some(v) = o {
        v.int();
    }
    match o {
        Some(inner) if inner.truthy() => {}
        _ => {}
    }
}";
        assert_eq!(
            scan(source, false),
            vec![
                "4:9 unsafe method call on safejs::raw::Value found: v.int(...)",
                "7:24 unsafe method call on safejs::raw::Value found: inner.truthy(...)",
            ]
        );
    }

    #[test]
    fn test_untyped_iterator_closure_parameter() {
        let source = "use safejs::raw;
fn f(vals: &[raw::Value]) {
    let _ = vals.iter().map(|v| v.string());
}";
        assert_eq!(
            scan(source, false),
            vec!["3:33 unsafe method call on safejs::raw::Value found: v.string(...)"]
        );
    }

    #[test]
    fn test_repeat_guard_and_statement_macros() {
        let source = "use safejs::raw;
fn f(v: raw::Value) {
    let _ = vec![raw::value_of(1); 3];
    let _ = matches!(1, n if v.truthy());
    run! { let n = v.int(); n }
    sql!(SELECT * FROM t);
}";
        assert_eq!(
            scan(source, false),
            vec![
                "3:18 unsafe call to safejs::raw found: raw::value_of(...)",
                "4:30 unsafe method call on safejs::raw::Value found: v.truthy(...)",
                "5:20 unsafe method call on safejs::raw::Value found: v.int(...)",
            ]
        );
    }

    #[test]
    fn test_closure_returned_from_recovery_is_not_wrapped() {
        let source = "use safejs::{catch::attempt, raw};
fn f(vals: Vec<raw::Value>) {
    let _ = attempt(|| move || raw::value_of(1));
    let _ = attempt(|| vals.iter().map(|v| v.string()).count());
}";
        assert_eq!(
            scan(source, false),
            vec!["3:32 unsafe call to safejs::raw found: raw::value_of(...)"]
        );
    }
}
