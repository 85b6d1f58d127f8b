//! Proxies that run a function inside the store.
//!
//! A [`RemoteFunction`] is built from the function's source text. Building
//! parses it, decides which receivers are remote objects and translates the
//! body. The script itself is assembled on the first call, when the
//! argument shapes are known, and registered with the shared
//! [`ScriptRegistry`]. Later calls only send arguments.
//!
//! # Example
//!
//! ```rust
//! use luaship::{MemoryStore, RemoteFunction, Value};
//!
//! # fn main() -> luaship::Result<()> {
//! let add_link = RemoteFunction::builder(
//!     "def add_link(client, url):
//!         link_id = client.incr('link-id')
//!         client.set('link-' + str(link_id), url)
//!         return link_id",
//! )
//! .build()?;
//!
//! let store = MemoryStore::new();
//! assert_eq!(add_link.call(&store, &[Value::from("https://example.com")])?.into_value(), Value::Int(1));
//! assert_eq!(add_link.call(&store, &[Value::from("https://example.org")])?.into_value(), Value::Int(2));
//! # Ok(())
//! # }
//! ```

use crate::analysis::{identify, LineRange};
use crate::config::Options;
use crate::connection::Connection;
use crate::error::{Error, Result};
use crate::host::{Environment, Instance};
use crate::marshal::{unpack, wire_values, Slot};
use crate::registry::{Outcome, ScriptId, ScriptRegistry};
use crate::syntax::{parse_function, Expr};
use crate::translate::Fragment;
use crate::value::Value;
use parking_lot::RwLock;
use std::fmt;
use std::sync::Arc;

/// Script state fixed by the first call.
#[derive(Debug)]
struct Compiled {
    id: ScriptId,
    text: String,
}

/// A function whose body runs as a script inside the store.
pub struct RemoteFunction {
    fragment: Fragment,
    environment: Environment,
    options: Options,
    registry: Arc<ScriptRegistry>,
    compiled: RwLock<Option<Arc<(Compiled, Vec<Slot>)>>>,
}

/// Builder for [`RemoteFunction`].
pub struct RemoteFunctionBuilder {
    source: String,
    remote_objects: Option<Vec<String>>,
    lines: Option<(usize, usize)>,
    environment: Environment,
    options: Options,
    registry: Option<Arc<ScriptRegistry>>,
}

impl RemoteFunctionBuilder {
    /// Names the remote objects explicitly (`client`, `self.db`) instead of
    /// identifying them from usage.
    pub fn remote_objects<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.remote_objects = Some(names.into_iter().map(Into::into).collect());
        self
    }

    /// Translates only the top-level statements on lines `min..=max`,
    /// counted from the `def` line.
    pub fn lines(mut self, min: usize, max: usize) -> Self {
        self.lines = Some((min, max));
        self
    }

    /// Constants the function may read.
    pub fn environment(mut self, environment: Environment) -> Self {
        self.environment = environment;
        self
    }

    /// Translation and call options.
    pub fn options(mut self, options: Options) -> Self {
        self.options = options;
        self
    }

    /// Shares a registry between proxies. Each proxy gets its own otherwise.
    pub fn registry(mut self, registry: Arc<ScriptRegistry>) -> Self {
        self.registry = Some(registry);
        self
    }

    /// Parses and translates the function.
    ///
    /// Fails with `IdentificationFailure` when no remote object is named or
    /// found, and with `Untranslatable` for constructs outside the subset.
    pub fn build(self) -> Result<RemoteFunction> {
        let def = parse_function(&self.source)?;

        let remote_objects = match self.remote_objects {
            Some(names) => names
                .iter()
                .map(|name| {
                    Expr::from_dotted(name)
                        .ok_or_else(|| Error::invalid_argument(format!("invalid remote object name `{}`", name)))
                })
                .collect::<Result<Vec<_>>>()?,
            None => identify(&def, &self.options),
        };

        let range = match self.lines {
            Some((min, max)) if min > max || min == 0 => {
                return Err(Error::invalid_argument(format!("invalid line range {}..={}", min, max)));
            }
            Some((min, max)) => LineRange { min, max },
            None => LineRange::whole(&def),
        };

        let fragment = Fragment::compile(&def, remote_objects, range, &self.environment, &self.options, false)?;
        log::info!(
            "translated `{}` with remote objects [{}]",
            fragment.name,
            fragment
                .remote_objects
                .iter()
                .map(ToString::to_string)
                .collect::<Vec<_>>()
                .join(", ")
        );

        Ok(RemoteFunction {
            fragment,
            environment: self.environment,
            options: self.options,
            registry: self.registry.unwrap_or_default(),
            compiled: RwLock::new(None),
        })
    }
}

impl RemoteFunction {
    /// Starts building a proxy for the `def` in `source`.
    pub fn builder(source: impl Into<String>) -> RemoteFunctionBuilder {
        RemoteFunctionBuilder {
            source: source.into(),
            remote_objects: None,
            lines: None,
            environment: Environment::new(),
            options: Options::default(),
            registry: None,
        }
    }

    /// Calls a plain function.
    pub fn call(&self, conn: &dyn Connection, args: &[Value]) -> Result<Outcome> {
        if self.fragment.method {
            return Err(Error::invalid_argument(format!(
                "`{}` is a method, use call_method",
                self.fragment.name
            )));
        }
        self.invoke(None, conn, args)
    }

    /// Calls a method on `instance`.
    pub fn call_method(&self, instance: &Instance, conn: &dyn Connection, args: &[Value]) -> Result<Outcome> {
        if !self.fragment.method {
            return Err(Error::invalid_argument(format!(
                "`{}` is not a method, use call",
                self.fragment.name
            )));
        }
        self.invoke(Some(instance), conn, args)
    }

    fn invoke(&self, instance: Option<&Instance>, conn: &dyn Connection, args: &[Value]) -> Result<Outcome> {
        let compiled = self.compiled(instance, conn, args)?;
        let (script, slots) = &*compiled;
        let values = wire_values(slots, args, instance, self.options.check_argument_shapes)?;
        log::debug!("invoking `{}` as {}", self.fragment.name, script.id);
        self.registry.invoke(conn, &script.id, &values)
    }

    /// Builds and registers the script on first use. Concurrent first calls
    /// may both build it; they produce the same text and id.
    fn compiled(
        &self,
        instance: Option<&Instance>,
        conn: &dyn Connection,
        args: &[Value],
    ) -> Result<Arc<(Compiled, Vec<Slot>)>> {
        if let Some(compiled) = self.compiled.read().as_ref() {
            return Ok(Arc::clone(compiled));
        }

        let preamble = unpack(&self.fragment, args, instance, &self.environment, &self.options)?;
        let text = self.fragment.script(&preamble);
        let id = self.registry.register(conn, &text)?;
        log::info!("compiled `{}` to script {}", self.fragment.name, id);

        let compiled = Arc::new((Compiled { id, text }, preamble.slots));
        let mut slot = self.compiled.write();
        Ok(Arc::clone(slot.get_or_insert(compiled)))
    }

    /// Name of the original function.
    pub fn name(&self) -> &str {
        &self.fragment.name
    }

    /// Names of the positional arguments a call supplies.
    pub fn inputs(&self) -> Vec<&str> {
        self.fragment.input_names()
    }

    /// Names handed back by a partial fragment.
    pub fn outputs(&self) -> &[String] {
        &self.fragment.outputs
    }

    /// True if the function takes `self`.
    pub fn is_method(&self) -> bool {
        self.fragment.method
    }

    /// Remote objects, as written in the source.
    pub fn remote_objects(&self) -> Vec<String> {
        self.fragment.remote_objects.iter().map(ToString::to_string).collect()
    }

    /// The complete script, once the first call has compiled it.
    pub fn script_text(&self) -> Option<String> {
        self.compiled.read().as_ref().map(|c| c.0.text.clone())
    }

    /// Id of the compiled script, once the first call has compiled it.
    pub fn script_id(&self) -> Option<ScriptId> {
        self.compiled.read().as_ref().map(|c| c.0.id.clone())
    }

    /// The translated body, without the runtime helpers and preamble.
    pub fn lua_body(&self) -> String {
        self.fragment.render_body()
    }

    /// The registry scripts are registered with.
    pub fn registry(&self) -> &Arc<ScriptRegistry> {
        &self.registry
    }
}

impl fmt::Debug for RemoteFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RemoteFunction")
            .field("name", &self.fragment.name)
            .field("remote_objects", &self.remote_objects())
            .field("script_id", &self.script_id())
            .finish()
    }
}

/// Translates a plain function into the complete script a call with `args`
/// would run.
pub fn compile_to_lua(source: &str, args: &[Value]) -> Result<String> {
    let function = RemoteFunction::builder(source).build()?;
    let preamble = unpack(
        &function.fragment,
        args,
        None,
        &function.environment,
        &function.options,
    )?;
    Ok(function.fragment.script(&preamble))
}
