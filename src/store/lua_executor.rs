//! LuaExecutor runs scripts against a store.
//!
//! Every script gets a fresh Lua state with `KEYS`, `ARGV`, the `redis`
//! library and `cjson`. Commands issued through `redis.call` go to a
//! [`ScriptContext`], which is committed only if the script succeeds.

use super::cjson;
use super::context::ScriptContext;
use super::reply::Reply;
use super::Inner;
use bytes::Bytes;
use mlua::{Lua, Table, Value as LuaValue};
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::{Duration, Instant};

const LOG_DEBUG: i64 = 0;
const LOG_VERBOSE: i64 = 1;
const LOG_NOTICE: i64 = 2;
const LOG_WARNING: i64 = 3;

/// Executes scripts with store access and an optional time limit.
pub struct LuaExecutor {
    inner: Arc<Inner>,

    /// Maximum script execution time
    timeout: Option<Duration>,
}

/// The `redis` library exposed to scripts.
struct LuaRedisApi;

impl LuaRedisApi {
    fn create_api_table<'lua>(lua: &'lua Lua, context: Arc<Mutex<ScriptContext>>) -> mlua::Result<Table<'lua>> {
        let table = lua.create_table()?;

        let ctx_call = Arc::clone(&context);
        let call_fn = lua.create_function(move |lua, args: mlua::Variadic<LuaValue<'_>>| {
            let args = command_args(&args)?;
            match ctx_call.lock().execute(&args) {
                Reply::Error(msg) => Err(mlua::Error::RuntimeError(msg)),
                reply => reply_to_lua(lua, reply),
            }
        })?;
        table.set("call", call_fn)?;

        let ctx_pcall = Arc::clone(&context);
        let pcall_fn = lua.create_function(move |lua, args: mlua::Variadic<LuaValue<'_>>| {
            let reply = match command_args(&args) {
                Ok(args) => ctx_pcall.lock().execute(&args),
                Err(e) => Reply::Error(e.to_string()),
            };
            reply_to_lua(lua, reply)
        })?;
        table.set("pcall", pcall_fn)?;

        let log_fn = lua.create_function(|_, (level, message): (i64, mlua::String<'_>)| {
            let message = message.to_string_lossy();
            match level {
                LOG_DEBUG | LOG_VERBOSE => log::debug!("script: {}", message),
                LOG_NOTICE => log::info!("script: {}", message),
                _ => log::warn!("script: {}", message),
            }
            Ok(())
        })?;
        table.set("log", log_fn)?;

        table.set("LOG_DEBUG", LOG_DEBUG)?;
        table.set("LOG_VERBOSE", LOG_VERBOSE)?;
        table.set("LOG_NOTICE", LOG_NOTICE)?;
        table.set("LOG_WARNING", LOG_WARNING)?;

        Ok(table)
    }
}

impl LuaExecutor {
    pub(crate) fn new(inner: Arc<Inner>, timeout: Option<Duration>) -> Self {
        Self { inner, timeout }
    }

    /// Runs `script` and converts its result into a reply.
    ///
    /// A script that raises an error, or runs past the timeout, yields an
    /// error reply and leaves the keyspace untouched.
    pub fn execute(&self, script: &str, keys: &[Bytes], argv: &[Bytes]) -> Reply {
        let start_time = Instant::now();

        let lua = Lua::new();
        let context = Arc::new(Mutex::new(ScriptContext::new(Arc::clone(&self.inner))));

        if let Some(timeout) = self.timeout {
            let timeout_start = start_time;
            lua.set_hook(
                mlua::HookTriggers {
                    every_nth_instruction: Some(1000),
                    ..Default::default()
                },
                move |_lua, _debug| {
                    if timeout_start.elapsed() > timeout {
                        Err(mlua::Error::RuntimeError("Script execution timeout".to_string()))
                    } else {
                        Ok(())
                    }
                },
            );
        }

        let result = (|| -> mlua::Result<Reply> {
            let globals = lua.globals();
            globals.set("KEYS", byte_table(&lua, keys)?)?;
            globals.set("ARGV", byte_table(&lua, argv)?)?;
            globals.set("redis", LuaRedisApi::create_api_table(&lua, Arc::clone(&context))?)?;
            globals.set("cjson", cjson::create_table(&lua)?)?;
            let value = lua.load(script).set_name("script").eval::<LuaValue<'_>>()?;
            lua_to_reply(&value)
        })();

        match result {
            Ok(reply) => {
                ScriptContext::commit_from_mutex(&context);
                log::info!("Lua script executed successfully in {:?}", start_time.elapsed());
                reply
            }
            Err(e) => {
                // Dropping the context discards its writes.
                log::warn!("Lua script failed: {}", e);
                Reply::Error(format!("ERR Error running script: {}", e))
            }
        }
    }

    /// Limits how long one script may run. `None` removes the limit.
    pub fn set_timeout(&mut self, timeout: Option<Duration>) {
        self.timeout = timeout;
    }

    /// The current script time limit.
    pub fn timeout(&self) -> Option<Duration> {
        self.timeout
    }
}

fn byte_table<'lua>(lua: &'lua Lua, items: &[Bytes]) -> mlua::Result<Table<'lua>> {
    let table = lua.create_table()?;
    for (i, item) in items.iter().enumerate() {
        table.raw_set(i + 1, lua.create_string(item.as_ref())?)?;
    }
    Ok(table)
}

/// Arguments of `redis.call`: strings and numbers only.
fn command_args(values: &[LuaValue<'_>]) -> mlua::Result<Vec<Bytes>> {
    values
        .iter()
        .map(|value| match value {
            LuaValue::String(s) => Ok(Bytes::copy_from_slice(s.as_bytes())),
            LuaValue::Integer(i) => Ok(Bytes::from(i.to_string())),
            LuaValue::Number(x) if x.fract() == 0.0 && x.is_finite() => Ok(Bytes::from((*x as i64).to_string())),
            LuaValue::Number(x) => Ok(Bytes::from(x.to_string())),
            _ => Err(mlua::Error::RuntimeError(
                "Lua redis lib command arguments must be strings or integers".to_string(),
            )),
        })
        .collect()
}

/// Converts a store reply into the Lua value a script sees.
fn reply_to_lua<'lua>(lua: &'lua Lua, reply: Reply) -> mlua::Result<LuaValue<'lua>> {
    Ok(match reply {
        Reply::Nil => LuaValue::Boolean(false),
        Reply::Integer(i) => LuaValue::Integer(i),
        Reply::Bulk(data) => LuaValue::String(lua.create_string(data.as_ref())?),
        Reply::Status(status) => {
            let table = lua.create_table()?;
            table.set("ok", status)?;
            LuaValue::Table(table)
        }
        Reply::Error(msg) => {
            let table = lua.create_table()?;
            table.set("err", msg)?;
            LuaValue::Table(table)
        }
        Reply::Array(items) => {
            let table = lua.create_table()?;
            for (i, item) in items.into_iter().enumerate() {
                table.raw_set(i + 1, reply_to_lua(lua, item)?)?;
            }
            LuaValue::Table(table)
        }
    })
}

/// Converts a script's return value into a reply.
fn lua_to_reply(value: &LuaValue<'_>) -> mlua::Result<Reply> {
    Ok(match value {
        LuaValue::Nil | LuaValue::Boolean(false) => Reply::Nil,
        LuaValue::Boolean(true) => Reply::Integer(1),
        LuaValue::Integer(i) => Reply::Integer(*i),
        LuaValue::Number(x) => Reply::Integer(*x as i64),
        LuaValue::String(s) => Reply::Bulk(Bytes::copy_from_slice(s.as_bytes())),
        LuaValue::Table(table) => {
            if let LuaValue::String(err) = table.raw_get::<_, LuaValue<'_>>("err")? {
                return Ok(Reply::Error(err.to_string_lossy().into_owned()));
            }
            if let LuaValue::String(ok) = table.raw_get::<_, LuaValue<'_>>("ok")? {
                return Ok(Reply::Status(ok.to_string_lossy().into_owned()));
            }
            let mut items = Vec::new();
            for i in 1i64.. {
                let item: LuaValue<'_> = table.raw_get(i)?;
                if matches!(item, LuaValue::Nil) {
                    break;
                }
                items.push(lua_to_reply(&item)?);
            }
            Reply::Array(items)
        }
        _ => Reply::Nil,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connection::args;
    use crate::store::MemoryStore;

    fn setup_executor() -> (MemoryStore, LuaExecutor) {
        let store = MemoryStore::new();
        let executor = LuaExecutor::new(Arc::clone(&store.inner), Some(Duration::from_secs(5)));
        (store, executor)
    }

    fn run(executor: &LuaExecutor, script: &str) -> Reply {
        executor.execute(script, &[], &[])
    }

    #[test]
    fn test_executor_commit_on_success() {
        let (store, executor) = setup_executor();
        let reply = run(&executor, "redis.call('set', 'key1', 'value1') return redis.call('incr', 'n')");
        assert_eq!(reply, Reply::Integer(1));
        assert_eq!(store.execute_command(&args(["GET", "key1"])), Reply::bulk("value1"));
    }

    #[test]
    fn test_executor_rollback_on_error() {
        let (store, executor) = setup_executor();
        let reply = run(&executor, "redis.call('set', 'key1', 'value1') error('Intentional error')");
        assert!(matches!(reply, Reply::Error(ref e) if e.contains("Intentional error")));
        assert_eq!(store.execute_command(&args(["GET", "key1"])), Reply::Nil);
    }

    #[test]
    fn test_executor_keys_and_argv() {
        let (_store, executor) = setup_executor();
        let reply = executor.execute(
            "return {KEYS[1], ARGV[1], ARGV[2]}",
            &args(["k"]),
            &args(["a", "b"]),
        );
        assert_eq!(
            reply,
            Reply::Array(vec![Reply::bulk("k"), Reply::bulk("a"), Reply::bulk("b")])
        );
    }

    #[test]
    fn test_executor_reply_conversion() {
        let (_store, executor) = setup_executor();
        assert_eq!(run(&executor, "return redis.call('get', 'missing')"), Reply::Nil);
        assert_eq!(run(&executor, "return true"), Reply::Integer(1));
        assert_eq!(run(&executor, "return 3.7"), Reply::Integer(3));
        assert_eq!(run(&executor, "return {ok = 'FINE'}"), Reply::Status("FINE".into()));
        assert_eq!(run(&executor, "return redis.call('set', 'a', 'b')['ok']"), Reply::bulk("OK"));
        assert_eq!(
            run(&executor, "return {1, 'a', nil, 3}"),
            Reply::Array(vec![Reply::Integer(1), Reply::bulk("a")])
        );
    }

    #[test]
    fn test_executor_call_and_pcall_errors() {
        let (_store, executor) = setup_executor();
        run(&executor, "redis.call('set', 'a', 'x')");
        let reply = run(&executor, "return redis.call('incr', 'a')");
        assert!(reply.is_error());
        let reply = run(&executor, "return redis.pcall('incr', 'a')");
        assert_eq!(reply, Reply::Error("ERR value is not an integer or out of range".into()));
        assert!(run(&executor, "return redis.call('get', {})").is_error());
    }

    #[test]
    fn test_executor_timeout() {
        let (_store, mut executor) = setup_executor();
        executor.set_timeout(Some(Duration::from_millis(100)));
        assert_eq!(executor.timeout(), Some(Duration::from_millis(100)));
        let reply = run(&executor, "local i = 0 while true do i = i + 1 end");
        assert!(matches!(reply, Reply::Error(ref e) if e.contains("timeout")));
    }

    #[test]
    fn test_executor_syntax_error() {
        let (_store, executor) = setup_executor();
        assert!(run(&executor, "redis.call('set', 'k', 'v'").is_error());
    }

    #[test]
    fn test_executor_number_arguments() {
        let (store, executor) = setup_executor();
        run(&executor, "redis.call('set', 'a', 10 / 2) redis.call('set', 'b', 2.5)");
        assert_eq!(store.execute_command(&args(["GET", "a"])), Reply::bulk("5"));
        assert_eq!(store.execute_command(&args(["GET", "b"])), Reply::bulk("2.5"));
    }
}
