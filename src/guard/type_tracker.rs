//! Static types of local bindings, as far as the raw module is concerned.
//!
//! This is not type inference. Types come from annotations (parameters,
//! `let` with a type, struct fields declared in the same file), from the
//! declared return types of functions and methods in the same file, and
//! from a fixed table of what raw operations return. Element types of the
//! common containers (`Vec`, `Option`, slices and the like) are carried
//! through iteration, `?`, `unwrap` and `Some(..)` patterns. Everything
//! else resolves to "unknown", and calls on unknown receivers are not
//! checked.

use super::imports::RawImports;
use once_cell::sync::Lazy;
use std::collections::HashMap;
use syn::{
    Expr, ExprCall, ExprField, ExprMethodCall, ExprPath, Fields, GenericArgument, ImplItem, Item,
    Pat, PatType, PathArguments, PathSegment, ReturnType, Type,
};

/// Return types of raw operations, relative to the raw module.
static RAW_RETURNS: Lazy<HashMap<&'static str, &'static str>> = Lazy::new(|| {
    [
        ("global", "Value"),
        ("null", "Value"),
        ("undefined", "Value"),
        ("value_of", "Value"),
        ("func_of", "Func"),
        ("Value::get", "Value"),
        ("Value::call", "Value"),
        ("Value::index", "Value"),
        ("Value::invoke", "Value"),
        ("Value::new", "Value"),
        ("Value::type_of", "Type"),
    ]
    .into_iter()
    .collect()
});

/// Public fields of raw types, relative to the raw module.
static RAW_FIELDS: Lazy<HashMap<&'static str, &'static str>> = Lazy::new(|| {
    [("Func::value", "Value"), ("Error::value", "Value")]
        .into_iter()
        .collect()
});

/// Types whose first type argument is their element.
const CONTAINERS: [&str; 8] = [
    "Vec",
    "VecDeque",
    "LinkedList",
    "HashSet",
    "BTreeSet",
    "Option",
    "Result",
    "IntoIter",
];

/// Types that deref to their first type argument.
const POINTERS: [&str; 4] = ["Box", "Rc", "Arc", "Cow"];

/// Methods returning a container of the receiver's element type.
const ELEMENT_PRESERVING: [&str; 22] = [
    "iter",
    "iter_mut",
    "into_iter",
    "copied",
    "cloned",
    "rev",
    "skip",
    "take",
    "step_by",
    "filter",
    "chain",
    "peekable",
    "by_ref",
    "skip_while",
    "take_while",
    "inspect",
    "as_ref",
    "as_mut",
    "as_slice",
    "as_deref",
    "to_vec",
    "ok",
];

/// Methods returning the element itself.
const ELEMENT_UNWRAPPING: [&str; 6] = [
    "unwrap",
    "expect",
    "unwrap_or",
    "unwrap_or_default",
    "unwrap_or_else",
    "unwrap_unchecked",
];

/// Methods returning an `Option` of the element.
const ELEMENT_OPTIONAL: [&str; 15] = [
    "next",
    "next_back",
    "peek",
    "first",
    "last",
    "get",
    "get_mut",
    "nth",
    "pop",
    "pop_front",
    "pop_back",
    "front",
    "back",
    "find",
    "max_by_key",
];

/// Methods whose closure argument receives the receiver's element first.
const ELEMENT_CLOSURES: [&str; 24] = [
    "map",
    "for_each",
    "try_for_each",
    "filter",
    "filter_map",
    "flat_map",
    "find",
    "find_map",
    "any",
    "all",
    "position",
    "inspect",
    "take_while",
    "skip_while",
    "and_then",
    "map_or",
    "map_or_else",
    "is_some_and",
    "is_ok_and",
    "max_by_key",
    "min_by_key",
    "partition",
    "retain",
    "sort_by_key",
];

/// Whether the closure passed to `method` is called with elements of the
/// receiver.
pub(crate) fn is_element_closure_method(method: &str) -> bool {
    ELEMENT_CLOSURES.contains(&method)
}

/// Tracks variable types within the current analysis scope
#[derive(Debug, Clone)]
pub(crate) struct TypeTracker<'a> {
    imports: &'a RawImports,
    /// Stack of scopes, innermost last
    scopes: Vec<Scope>,
    /// Struct name to field name to declared field type
    struct_fields: HashMap<String, HashMap<String, Type>>,
    /// Free function name to declared return type
    functions: HashMap<String, Type>,
    /// Impl type to method name to declared return type
    methods: HashMap<String, HashMap<String, Type>>,
}

#[derive(Debug, Clone)]
struct Scope {
    /// `None` marks a binding whose type is unknown; it still shadows
    /// outer bindings of the same name.
    variables: HashMap<String, Option<ResolvedType>>,
    kind: ScopeKind,
    impl_type: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct ResolvedType {
    /// Canonical path for raw types, the written path otherwise
    pub type_name: String,
    pub source: TypeSource,
    /// Element type, for containers
    pub element: Option<Box<ResolvedType>>,
}

impl ResolvedType {
    fn new(type_name: String, source: TypeSource) -> Self {
        Self {
            type_name,
            source,
            element: None,
        }
    }

    pub(crate) fn element(&self) -> Option<ResolvedType> {
        self.element.as_deref().cloned()
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) enum TypeSource {
    /// Explicit type annotation
    Annotation,
    /// Return type of a raw operation or a function in the file
    FunctionReturn,
    /// Field access
    FieldAccess,
    /// `Type::new()` and friends on a local type
    Constructor,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) enum ScopeKind {
    Module,
    Impl,
    Function,
    Closure,
    Block,
}

impl<'a> TypeTracker<'a> {
    pub(crate) fn new(imports: &'a RawImports) -> Self {
        Self {
            imports,
            scopes: vec![Scope {
                variables: HashMap::new(),
                kind: ScopeKind::Module,
                impl_type: None,
            }],
            struct_fields: HashMap::new(),
            functions: HashMap::new(),
            methods: HashMap::new(),
        }
    }

    /// Records struct fields and the return types of functions and
    /// methods declared in `items`, including inline modules.
    pub(crate) fn index_items(&mut self, items: &[Item]) {
        for item in items {
            match item {
                Item::Struct(item) => {
                    if let Fields::Named(fields) = &item.fields {
                        let fields = fields
                            .named
                            .iter()
                            .filter_map(|f| Some((f.ident.as_ref()?.to_string(), f.ty.clone())))
                            .collect();
                        self.struct_fields.insert(item.ident.to_string(), fields);
                    }
                }
                Item::Fn(item) => {
                    if let ReturnType::Type(_, ty) = &item.sig.output {
                        self.functions
                            .insert(item.sig.ident.to_string(), (**ty).clone());
                    }
                }
                Item::Impl(item) => {
                    let Some(impl_type) = self.resolve_type_in(&item.self_ty, None) else {
                        continue;
                    };
                    let methods = self.methods.entry(impl_type).or_default();
                    for impl_item in &item.items {
                        if let ImplItem::Fn(method) = impl_item {
                            if let ReturnType::Type(_, ty) = &method.sig.output {
                                methods.insert(method.sig.ident.to_string(), (**ty).clone());
                            }
                        }
                    }
                }
                Item::Mod(module) => {
                    if let Some((_, items)) = &module.content {
                        self.index_items(items);
                    }
                }
                _ => {}
            }
        }
    }

    pub(crate) fn enter_scope(&mut self, kind: ScopeKind, impl_type: Option<String>) {
        self.scopes.push(Scope {
            variables: HashMap::new(),
            kind,
            impl_type,
        });
    }

    pub(crate) fn exit_scope(&mut self) {
        if self.scopes.len() > 1 {
            self.scopes.pop();
        }
    }

    fn record_variable(&mut self, name: String, resolved: Option<ResolvedType>) {
        if let Some(scope) = self.scopes.last_mut() {
            scope.variables.insert(name, resolved);
        }
    }

    /// Binds the names introduced by a parameter or `let` pattern.
    pub(crate) fn bind_pattern(&mut self, pat: &Pat, init: Option<&Expr>) {
        match pat {
            Pat::Type(PatType { pat, ty, .. }) => {
                let resolved = self.resolve_annotation(ty);
                self.bind_resolved(pat, resolved);
            }
            _ => {
                let resolved = init.and_then(|init| self.resolve_expr_type(init));
                self.bind_resolved(pat, resolved);
            }
        }
    }

    /// Binds a pattern matched against elements of `container`, as in
    /// `for pat in container`.
    pub(crate) fn bind_element(&mut self, pat: &Pat, container: Option<ResolvedType>) {
        let element = container.and_then(|container| container.element());
        self.bind_resolved(pat, element);
    }

    /// Binds a pattern matched against a value of type `resolved`.
    /// Identifiers take the type; `Some(..)`, `Ok(..)` and slice patterns
    /// take the element type; every other name is shadowed as unknown.
    pub(crate) fn bind_resolved(&mut self, pat: &Pat, resolved: Option<ResolvedType>) {
        match pat {
            Pat::Ident(ident) => {
                self.record_variable(ident.ident.to_string(), resolved.clone());
                if let Some((_, sub)) = &ident.subpat {
                    self.bind_resolved(sub, resolved);
                }
            }
            Pat::Reference(reference) => self.bind_resolved(&reference.pat, resolved),
            Pat::Paren(paren) => self.bind_resolved(&paren.pat, resolved),
            Pat::Type(_) => self.bind_pattern(pat, None),
            Pat::TupleStruct(tuple) => {
                let unwraps = tuple
                    .path
                    .segments
                    .last()
                    .is_some_and(|seg| seg.ident == "Some" || seg.ident == "Ok");
                for elem in &tuple.elems {
                    let inner = if unwraps && tuple.elems.len() == 1 {
                        resolved.as_ref().and_then(ResolvedType::element)
                    } else {
                        None
                    };
                    self.bind_resolved(elem, inner);
                }
            }
            Pat::Slice(slice) => {
                for elem in &slice.elems {
                    // `rest @ ..` is the remaining slice
                    let elem_type = if is_rest_binding(elem) {
                        resolved.clone()
                    } else {
                        resolved.as_ref().and_then(ResolvedType::element)
                    };
                    self.bind_resolved(elem, elem_type);
                }
            }
            Pat::Tuple(tuple) => {
                for elem in &tuple.elems {
                    self.bind_resolved(elem, None);
                }
            }
            Pat::Struct(pat_struct) => {
                for field in &pat_struct.fields {
                    self.bind_resolved(&field.pat, None);
                }
            }
            Pat::Or(or) => {
                for case in &or.cases {
                    self.bind_resolved(case, resolved.clone());
                }
            }
            _ => {}
        }
    }

    /// Resolve a variable's type by looking through the scope stack
    pub(crate) fn resolve_variable_type(&self, name: &str) -> Option<ResolvedType> {
        self.scopes
            .iter()
            .rev()
            .find_map(|scope| scope.variables.get(name))
            .cloned()
            .flatten()
    }

    pub(crate) fn current_impl_type(&self) -> Option<String> {
        self.scopes
            .iter()
            .rev()
            .find(|scope| scope.kind == ScopeKind::Impl)
            .and_then(|scope| scope.impl_type.clone())
    }

    /// Name of a written type: canonical when it refers into the raw
    /// module, as written otherwise. References and grouping are looked
    /// through.
    pub(crate) fn resolve_type(&self, ty: &Type) -> Option<String> {
        let impl_type = self.current_impl_type();
        self.resolve_type_in(ty, impl_type.as_deref())
    }

    /// [`Self::resolve_type`] with `Self` standing for `self_type`.
    fn resolve_type_in(&self, ty: &Type, self_type: Option<&str>) -> Option<String> {
        match ty {
            Type::Reference(reference) => self.resolve_type_in(&reference.elem, self_type),
            Type::Paren(paren) => self.resolve_type_in(&paren.elem, self_type),
            Type::Group(group) => self.resolve_type_in(&group.elem, self_type),
            Type::Path(type_path) if type_path.qself.is_none() => {
                let segments = path_segments(&type_path.path);
                if segments.len() == 1 && segments[0] == "Self" {
                    return self_type.map(str::to_string);
                }
                self.imports
                    .canonicalize(&segments)
                    .or_else(|| Some(segments.join("::")))
            }
            _ => None,
        }
    }

    /// Full resolution of an annotation, element types included. Smart
    /// pointers resolve to what they point at.
    pub(crate) fn resolve_annotation(&self, ty: &Type) -> Option<ResolvedType> {
        let impl_type = self.current_impl_type();
        self.resolve_annotation_in(ty, impl_type.as_deref(), TypeSource::Annotation)
    }

    fn resolve_annotation_in(
        &self,
        ty: &Type,
        self_type: Option<&str>,
        source: TypeSource,
    ) -> Option<ResolvedType> {
        match ty {
            Type::Reference(reference) => {
                self.resolve_annotation_in(&reference.elem, self_type, source)
            }
            Type::Paren(paren) => self.resolve_annotation_in(&paren.elem, self_type, source),
            Type::Group(group) => self.resolve_annotation_in(&group.elem, self_type, source),
            Type::Slice(slice) => Some(ResolvedType {
                type_name: "[]".to_string(),
                source,
                element: self
                    .resolve_annotation_in(&slice.elem, self_type, source)
                    .map(Box::new),
            }),
            Type::Array(array) => Some(ResolvedType {
                type_name: "[]".to_string(),
                source,
                element: self
                    .resolve_annotation_in(&array.elem, self_type, source)
                    .map(Box::new),
            }),
            Type::Path(type_path) if type_path.qself.is_none() => {
                let last = type_path.path.segments.last()?;
                let argument = first_type_argument(last);
                let ident = last.ident.to_string();
                if let Some(inner) = argument.filter(|_| POINTERS.contains(&ident.as_str())) {
                    return self.resolve_annotation_in(inner, self_type, source);
                }
                let type_name = self.resolve_type_in(ty, self_type)?;
                let element = argument
                    .filter(|_| CONTAINERS.contains(&ident.as_str()))
                    .and_then(|inner| self.resolve_annotation_in(inner, self_type, source))
                    .map(Box::new);
                Some(ResolvedType {
                    type_name,
                    source,
                    element,
                })
            }
            _ => None,
        }
    }

    /// Resolve the type of an expression
    pub(crate) fn resolve_expr_type(&self, expr: &Expr) -> Option<ResolvedType> {
        match expr {
            Expr::Path(ExprPath { path, qself: None, .. }) if path.segments.len() == 1 => {
                let ident = path.segments.first()?.ident.to_string();
                if ident == "self" {
                    return self
                        .current_impl_type()
                        .map(|type_name| ResolvedType::new(type_name, TypeSource::Annotation));
                }
                self.resolve_variable_type(&ident)
            }
            Expr::Reference(reference) => self.resolve_expr_type(&reference.expr),
            Expr::Paren(paren) => self.resolve_expr_type(&paren.expr),
            Expr::Group(group) => self.resolve_expr_type(&group.expr),
            Expr::Unary(unary) if matches!(unary.op, syn::UnOp::Deref(_)) => {
                self.resolve_expr_type(&unary.expr)
            }
            Expr::Cast(cast) => self.resolve_annotation(&cast.ty),
            Expr::Field(field) => self.resolve_field_access(field),
            Expr::MethodCall(call) => self.resolve_method_call_type(call),
            Expr::Call(call) => self.resolve_function_call_type(call),
            Expr::Try(try_expr) => self.resolve_expr_type(&try_expr.expr)?.element(),
            Expr::Index(index) => self.resolve_expr_type(&index.expr)?.element(),
            _ => None,
        }
    }

    /// The part of `type_name` below the raw module, if it is in it.
    fn raw_relative<'n>(&self, type_name: &'n str) -> Option<&'n str> {
        type_name
            .strip_prefix(self.imports.raw_path())?
            .strip_prefix("::")
    }

    fn raw_type(&self, relative: &str) -> String {
        format!("{}::{}", self.imports.raw_path(), relative)
    }

    fn resolve_field_access(&self, field: &ExprField) -> Option<ResolvedType> {
        let base = self.resolve_expr_type(&field.base)?;
        let syn::Member::Named(member) = &field.member else {
            return None;
        };
        let member = member.to_string();

        match self.raw_relative(&base.type_name) {
            Some(relative) => {
                let field_type = RAW_FIELDS.get(format!("{relative}::{member}").as_str())?;
                Some(ResolvedType::new(
                    self.raw_type(field_type),
                    TypeSource::FieldAccess,
                ))
            }
            None => {
                let ty = self.struct_fields.get(&base.type_name)?.get(&member)?;
                self.resolve_annotation_in(ty, Some(base.type_name.as_str()), TypeSource::FieldAccess)
            }
        }
    }

    fn resolve_method_call_type(&self, call: &ExprMethodCall) -> Option<ResolvedType> {
        let receiver = self.resolve_expr_type(&call.receiver)?;
        let method = call.method.to_string();
        if method == "clone" {
            return Some(receiver);
        }
        if let Some(relative) = self.raw_relative(&receiver.type_name) {
            let returned = RAW_RETURNS.get(format!("{relative}::{method}").as_str())?;
            return Some(ResolvedType::new(
                self.raw_type(returned),
                TypeSource::FunctionReturn,
            ));
        }
        if let Some(returned) = self
            .methods
            .get(&receiver.type_name)
            .and_then(|methods| methods.get(&method))
        {
            return self.resolve_annotation_in(
                returned,
                Some(receiver.type_name.as_str()),
                TypeSource::FunctionReturn,
            );
        }
        resolve_container_method(receiver, &method)
    }

    fn resolve_function_call_type(&self, call: &ExprCall) -> Option<ResolvedType> {
        let Expr::Path(ExprPath { path, qself: None, .. }) = &*call.func else {
            return None;
        };
        let segments = path_segments(path);
        if let Some(canonical) = self.imports.canonicalize(&segments) {
            let relative = self.raw_relative(&canonical)?;
            let returned = RAW_RETURNS.get(relative)?;
            return Some(ResolvedType::new(
                self.raw_type(returned),
                TypeSource::FunctionReturn,
            ));
        }

        match segments.as_slice() {
            [name] => {
                let returned = self.functions.get(name)?;
                self.resolve_annotation_in(returned, None, TypeSource::FunctionReturn)
            }
            [ty, method] => {
                let type_name = if ty == "Self" {
                    self.current_impl_type()?
                } else {
                    ty.clone()
                };
                if let Some(returned) = self
                    .methods
                    .get(&type_name)
                    .and_then(|methods| methods.get(method))
                {
                    return self.resolve_annotation_in(
                        returned,
                        Some(type_name.as_str()),
                        TypeSource::FunctionReturn,
                    );
                }
                // Local constructors: `Wrapper::new()` is assumed to return `Wrapper`
                is_constructor_method(method)
                    .then(|| ResolvedType::new(type_name, TypeSource::Constructor))
            }
            _ => None,
        }
    }
}

/// Element-aware results of iterator, `Option` and collection methods.
fn resolve_container_method(receiver: ResolvedType, method: &str) -> Option<ResolvedType> {
    let element = receiver.element.clone()?;
    if ELEMENT_PRESERVING.contains(&method) {
        Some(ResolvedType {
            source: TypeSource::FunctionReturn,
            ..receiver
        })
    } else if ELEMENT_UNWRAPPING.contains(&method) {
        Some(*element)
    } else if ELEMENT_OPTIONAL.contains(&method) {
        Some(ResolvedType {
            type_name: "Option".to_string(),
            source: TypeSource::FunctionReturn,
            element: Some(element),
        })
    } else {
        None
    }
}

fn is_rest_binding(pat: &Pat) -> bool {
    match pat {
        Pat::Ident(ident) => ident
            .subpat
            .as_ref()
            .is_some_and(|(_, sub)| matches!(**sub, Pat::Rest(_))),
        _ => false,
    }
}

fn first_type_argument(segment: &PathSegment) -> Option<&Type> {
    let PathArguments::AngleBracketed(args) = &segment.arguments else {
        return None;
    };
    args.args.iter().find_map(|arg| match arg {
        GenericArgument::Type(ty) => Some(ty),
        _ => None,
    })
}

fn is_constructor_method(method_name: &str) -> bool {
    matches!(method_name, "new" | "default" | "from")
}

pub(crate) fn path_segments(path: &syn::Path) -> Vec<String> {
    path.segments.iter().map(|seg| seg.ident.to_string()).collect()
}
