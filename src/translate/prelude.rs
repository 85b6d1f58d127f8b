//! Runtime support code prepended to every generated script.
//!
//! The helpers only use the Lua 5.1 subset, so scripts run on any store that
//! embeds Lua 5.1 or later.

/// Helpers for truthiness, short-circuit operators, `+`, `len`, iteration,
/// string replacement and the return envelope.
pub const HEADER: &str = r#"local __TRUE = function(v)
  if v == nil or v == false or v == 0 or v == '' then
    return false
  end
  if type(v) == 'table' then
    for k, _ in pairs(v) do
      if k ~= '__DICT' then
        return true
      end
    end
    return false
  end
  return true
end

local __AND = function(v, ...)
  for i = 1, select('#', ...) do
    if not __TRUE(v) then
      return v
    end
    v = (select(i, ...))()
  end
  return v
end

local __OR = function(v, ...)
  for i = 1, select('#', ...) do
    if __TRUE(v) then
      return v
    end
    v = (select(i, ...))()
  end
  return v
end

local __ADD = function(a, b)
  if type(a) == 'number' and type(b) == 'number' then
    return a + b
  end
  if type(a) == 'table' and type(b) == 'table' then
    local out = {}
    for _, v in ipairs(a) do
      out[#out + 1] = v
    end
    for _, v in ipairs(b) do
      out[#out + 1] = v
    end
    return out
  end
  return tostring(a) .. tostring(b)
end

local __LEN = function(v)
  if type(v) == 'table' and v.__DICT then
    local n = 0
    for k, _ in pairs(v) do
      if k ~= '__DICT' then
        n = n + 1
      end
    end
    return n
  end
  return #v
end

local __ITER = function(v)
  if type(v) == 'table' and v.__DICT then
    local keys = {}
    for k, _ in pairs(v) do
      if k ~= '__DICT' then
        keys[#keys + 1] = k
      end
    end
    table.sort(keys)
    return ipairs(keys)
  end
  return ipairs(v)
end

local __REPLACE = function(s, old, new)
  if old == '' then
    return s
  end
  local out, pos = {}, 1
  while true do
    local i, j = string.find(s, old, pos, true)
    if i == nil then
      break
    end
    out[#out + 1] = string.sub(s, pos, i - 1)
    out[#out + 1] = new
    pos = j + 1
  end
  out[#out + 1] = string.sub(s, pos)
  return table.concat(out)
end

local __RETVAL = function(value, returned, live)
  return cjson.encode({returned = returned, value = value, live = live})
end
"#;

/// Capture of primitive results per receiver, drained by `execute()`.
pub const PIPELINED: &str = r#"
local __PIPES = {}
local __PIPE_COUNTS = {}
local __PIPE_ADD = function(key, value)
  if value == false then
    value = nil
  end
  local n = (__PIPE_COUNTS[key] or 0) + 1
  __PIPE_COUNTS[key] = n
  if __PIPES[key] == nil then
    __PIPES[key] = {}
  end
  __PIPES[key][n] = value
  return value
end
local __PIPE_GET = function(key)
  local values = __PIPES[key] or {}
  __PIPES[key] = {}
  __PIPE_COUNTS[key] = 0
  return values
end
"#;

/// Used when no receiver is ever drained: results pass straight through.
pub const UNPIPELINED: &str = r#"
local __PIPE_ADD = function(key, value)
  if value == false then
    return nil
  end
  return value
end
"#;

/// Lua keywords and globals the generated code relies on. Python names that
/// collide get a trailing underscore.
pub const RESERVED_NAMES: &[&str] = &[
    "ARGV", "KEYS", "and", "break", "cjson", "do", "else", "elseif", "end", "false", "for",
    "function", "goto", "if", "in", "ipairs", "local", "math", "nil", "not", "or", "pairs",
    "redis", "repeat", "return", "select", "string", "table", "then", "tonumber", "tostring",
    "true", "type", "until", "while",
];

/// Maps a Python identifier to a Lua local name.
pub fn lua_name(name: &str) -> String {
    if RESERVED_NAMES.contains(&name) {
        format!("{}_", name)
    } else {
        name.to_string()
    }
}

/// Renders `s` as a single-quoted Lua string literal.
pub fn lua_string(s: &str) -> String {
    let mut out = String::with_capacity(s.len() + 2);
    out.push('\'');
    for c in s.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '\'' => out.push_str("\\'"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            c if (c as u32) < 0x20 || c as u32 == 0x7f => {
                out.push_str(&format!("\\{:03}", c as u32));
            }
            c => out.push(c),
        }
    }
    out.push('\'');
    out
}

/// Renders a float so that Lua reads back the same number.
pub fn lua_float(x: f64) -> String {
    if x.is_nan() {
        "(0/0)".to_string()
    } else if x.is_infinite() {
        if x > 0.0 {
            "math.huge".to_string()
        } else {
            "(-math.huge)".to_string()
        }
    } else {
        format!("{:?}", x)
    }
}
