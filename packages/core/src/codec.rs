//! Closure codec: marshal a captured procedure into a descriptor and
//! reconstruct it on the other side.
//!
//! There is no runtime reflection. Every closure kind that may travel is
//! registered up front in a [`Registry`] with its reconstruction parameter
//! schema and a reconstruction function. Sender and receiver must register
//! the same kinds under the same [`ClosureType`].
//!
//! # Argument layout
//!
//! Descriptor arguments are in *captured field* order. The reconstruction
//! entry point takes them rotated by one: for `N` parameters, parameter `i`
//! is bound to field `(i + N - 1) mod N`, so the last captured field becomes
//! the first parameter. Parameters of type [`ArgType::Context`] are bound to
//! the receiving context instead of anything recorded on the wire.
//!
//! ```rust
//! use shuttle_core::codec::{self, CapturedClosure, ClosureKind, Registry};
//! use shuttle_wire::{ArgType, Value};
//!
//! let mut registry = Registry::new();
//! registry.register(ClosureKind::procedure(
//!     "demo.log",
//!     vec![ArgType::String, ArgType::Context, ArgType::Integer],
//!     |_ctx, _args| {},
//! ));
//!
//! // Fields: [context, count, message] -> parameters: [message, context, count]
//! let closure = CapturedClosure::new("demo.log")
//!     .context()
//!     .field(ArgType::Integer, 3)
//!     .field(ArgType::String, "hello");
//!
//! let descriptor = codec::encode(&closure, &registry).unwrap();
//! assert_eq!(descriptor.args, vec![Value::Null, Value::from(3), Value::from("hello")]);
//! ```

use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use shuttle_wire::{ArgType, ClosureDescriptor, ClosureType, Value};

use crate::context::Context;
use crate::error::{Result, ShuttleError};

/// A captured field of a closure: its declared type and current value.
#[derive(Clone, Debug, PartialEq)]
pub struct Field {
    pub ty: ArgType,
    pub value: Value,
}

impl Field {
    pub fn new(ty: ArgType, value: impl Into<Value>) -> Self {
        Self {
            ty,
            value: value.into(),
        }
    }

    /// A captured reference to the sending context. Never marshaled.
    pub fn context() -> Self {
        Self {
            ty: ArgType::Context,
            value: Value::Null,
        }
    }
}

/// A procedure together with its captured fields.
pub trait Closure {
    fn closure_type(&self) -> ClosureType;

    /// Captured fields in declaration order.
    fn fields(&self) -> Vec<Field>;
}

/// A closure assembled field by field.
#[derive(Clone, Debug)]
pub struct CapturedClosure {
    type_id: ClosureType,
    fields: Vec<Field>,
}

impl CapturedClosure {
    pub fn new(type_id: impl Into<ClosureType>) -> Self {
        Self {
            type_id: type_id.into(),
            fields: Vec::new(),
        }
    }

    pub fn field(mut self, ty: ArgType, value: impl Into<Value>) -> Self {
        self.fields.push(Field::new(ty, value));
        self
    }

    pub fn context(mut self) -> Self {
        self.fields.push(Field::context());
        self
    }
}

impl Closure for CapturedClosure {
    fn closure_type(&self) -> ClosureType {
        self.type_id.clone()
    }

    fn fields(&self) -> Vec<Field> {
        self.fields.clone()
    }
}

/// One bound reconstruction argument.
#[derive(Clone)]
pub enum Arg {
    Value(Value),
    Context(Context),
}

impl fmt::Debug for Arg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Arg::Value(v) => f.debug_tuple("Value").field(v).finish(),
            Arg::Context(c) => f.debug_tuple("Context").field(&c.id()).finish(),
        }
    }
}

/// Reconstruction arguments in entry-point parameter order.
#[derive(Clone, Debug)]
pub struct Args(Vec<Arg>);

impl Args {
    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// The value bound to parameter `index`, or `None` for context
    /// parameters and out-of-range indices.
    pub fn value(&self, index: usize) -> Option<&Value> {
        match self.0.get(index)? {
            Arg::Value(v) => Some(v),
            Arg::Context(_) => None,
        }
    }

    pub fn str(&self, index: usize) -> Option<&str> {
        self.value(index)?.as_str()
    }

    pub fn i64(&self, index: usize) -> Option<i64> {
        self.value(index)?.as_i64()
    }

    pub fn context(&self, index: usize) -> Option<&Context> {
        match self.0.get(index)? {
            Arg::Context(c) => Some(c),
            Arg::Value(_) => None,
        }
    }

    pub fn into_vec(self) -> Vec<Arg> {
        self.0
    }
}

/// A reconstructed procedure, ready to run once in the receiving context.
pub struct Invocation(Box<dyn FnOnce(&Context) + Send>);

impl Invocation {
    pub fn new(f: impl FnOnce(&Context) + Send + 'static) -> Self {
        Self(Box::new(f))
    }

    pub fn invoke(self, context: &Context) {
        (self.0)(context)
    }
}

impl fmt::Debug for Invocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Invocation")
    }
}

/// Builds the reconstructed value from bound arguments.
///
/// A well-formed kind yields a boxed [`Invocation`]; anything else is
/// reported as [`ShuttleError::InvalidClosure`] at decode time.
pub type Reconstruct = Arc<dyn Fn(Args) -> Result<Box<dyn Any + Send>> + Send + Sync>;

/// A registered closure kind.
#[derive(Clone)]
pub struct ClosureKind {
    type_id: ClosureType,
    params: Vec<ArgType>,
    reconstruct: Reconstruct,
}

impl ClosureKind {
    /// Register a kind with an arbitrary reconstruction function.
    pub fn new(
        type_id: impl Into<ClosureType>,
        params: Vec<ArgType>,
        reconstruct: impl Fn(Args) -> Result<Box<dyn Any + Send>> + Send + Sync + 'static,
    ) -> Self {
        Self {
            type_id: type_id.into(),
            params,
            reconstruct: Arc::new(reconstruct),
        }
    }

    /// Register a kind whose invocation runs `f` with the receiving context
    /// and the bound arguments.
    pub fn procedure(
        type_id: impl Into<ClosureType>,
        params: Vec<ArgType>,
        f: impl Fn(&Context, &Args) + Send + Sync + 'static,
    ) -> Self {
        let f = Arc::new(f);
        Self::new(type_id, params, move |args| {
            let f = Arc::clone(&f);
            let invocation = Invocation::new(move |ctx| f(ctx, &args));
            Ok(Box::new(invocation) as Box<dyn Any + Send>)
        })
    }

    pub fn type_id(&self) -> &ClosureType {
        &self.type_id
    }

    /// Reconstruction parameter types, in entry-point order.
    pub fn params(&self) -> &[ArgType] {
        &self.params
    }
}

impl fmt::Debug for ClosureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClosureKind")
            .field("type_id", &self.type_id)
            .field("params", &self.params)
            .finish()
    }
}

/// Closure kinds known to a context.
#[derive(Clone, Debug, Default)]
pub struct Registry {
    kinds: HashMap<ClosureType, ClosureKind>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a kind, replacing any kind registered under the same type id.
    pub fn register(&mut self, kind: ClosureKind) -> &mut Self {
        self.kinds.insert(kind.type_id.clone(), kind);
        self
    }

    pub fn get(&self, type_id: &ClosureType) -> Option<&ClosureKind> {
        self.kinds.get(type_id)
    }

    pub fn contains(&self, type_id: &ClosureType) -> bool {
        self.kinds.contains_key(type_id)
    }

    pub fn len(&self) -> usize {
        self.kinds.len()
    }

    pub fn is_empty(&self) -> bool {
        self.kinds.is_empty()
    }

    fn kind(&self, type_id: &ClosureType) -> Result<&ClosureKind> {
        self.get(type_id)
            .ok_or_else(|| ShuttleError::marshal(type_id, "no reconstruction entry point"))
    }
}

/// Field index bound to reconstruction parameter `param` of `count`.
/// A kind without parameters binds nothing; `0` is returned.
pub(crate) fn field_for_param(param: usize, count: usize) -> usize {
    if count == 0 {
        return 0;
    }
    (param + count - 1) % count
}

/// Marshal `closure` into a descriptor.
pub fn encode(closure: &dyn Closure, registry: &Registry) -> Result<ClosureDescriptor> {
    let type_id = closure.closure_type();
    let kind = registry.kind(&type_id)?;
    let params = kind.params();
    let count = params.len();
    if count == 0 {
        return Ok(ClosureDescriptor::new(type_id, Vec::new()));
    }

    let fields = closure.fields();
    if fields.len() < count {
        return Err(ShuttleError::marshal(
            &type_id,
            format!(
                "parameter types mismatch: {} parameters, {} fields",
                count,
                fields.len()
            ),
        ));
    }

    for (i, param) in params.iter().enumerate() {
        let field = &fields[field_for_param(i, count)];
        if field.ty != *param {
            return Err(ShuttleError::marshal(
                &type_id,
                format!(
                    "parameter types mismatch: parameter {} is {}, field is {}",
                    i, param, field.ty
                ),
            ));
        }
        if field.ty != ArgType::Context && !field.ty.accepts(&field.value) {
            return Err(ShuttleError::marshal(
                &type_id,
                format!(
                    "field for parameter {} is declared {} but holds {}",
                    i,
                    field.ty,
                    field.value.arg_type()
                ),
            ));
        }
    }

    let args = fields
        .into_iter()
        .take(count)
        .map(|field| match field.ty {
            ArgType::Context => Value::Null,
            _ => field.value,
        })
        .collect();

    Ok(ClosureDescriptor::new(type_id, args))
}

/// Reconstruct the procedure in `descriptor`, binding context parameters to
/// `context`.
pub fn decode(
    descriptor: &ClosureDescriptor,
    registry: &Registry,
    context: &Context,
) -> Result<Invocation> {
    let type_id = &descriptor.type_id;
    let kind = registry.kind(type_id)?;
    let params = kind.params();
    let count = params.len();
    if descriptor.args.len() != count {
        return Err(ShuttleError::marshal(
            type_id,
            format!(
                "expected {} arguments, descriptor has {}",
                count,
                descriptor.args.len()
            ),
        ));
    }

    let mut bound = Vec::with_capacity(count);
    for (i, param) in params.iter().enumerate() {
        if *param == ArgType::Context {
            bound.push(Arg::Context(context.clone()));
            continue;
        }
        let value = &descriptor.args[field_for_param(i, count)];
        if !param.accepts(value) {
            return Err(ShuttleError::marshal(
                type_id,
                format!(
                    "argument for parameter {} is {}, expected {}",
                    i,
                    value.arg_type(),
                    param
                ),
            ));
        }
        bound.push(Arg::Value(value.clone()));
    }

    let built = (kind.reconstruct)(Args(bound))?;
    built
        .downcast::<Invocation>()
        .map(|invocation| *invocation)
        .map_err(|_| ShuttleError::InvalidClosure {
            type_id: type_id.clone(),
        })
}
