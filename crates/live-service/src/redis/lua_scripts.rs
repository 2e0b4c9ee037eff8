//! Lua scripts for the room store.
//!
//! The cache has no multi-key transactions, so every read-check-write that
//! must not interleave with another writer runs as a script.

/// Overwrite a key while keeping its remaining TTL.
///
/// Arguments:
/// - KEYS[1]: Key to overwrite
/// - ARGV[1]: New value
///
/// Returns:
/// - 1: Written
/// - 0: Key does not exist (nothing written)
pub const UPDATE_KEEP_TTL: &str = r#"
local ttl = redis.call('PTTL', KEYS[1])
if ttl == -2 then
    return 0
end

if ttl == -1 then
    redis.call('SET', KEYS[1], ARGV[1])
else
    redis.call('SET', KEYS[1], ARGV[1], 'PX', ttl)
end
return 1
"#;

/// Overwrite a key only if it exists, replacing its TTL.
///
/// Arguments:
/// - KEYS[1]: Key to overwrite
/// - ARGV[1]: New value
/// - ARGV[2]: TTL in milliseconds, 0 to persist
///
/// Returns:
/// - 1: Written
/// - 0: Key does not exist (nothing written)
pub const UPDATE_IF_EXISTS: &str = r#"
if redis.call('EXISTS', KEYS[1]) == 0 then
    return 0
end

local ttl = tonumber(ARGV[2])
if ttl == nil or ttl <= 0 then
    redis.call('SET', KEYS[1], ARGV[1])
else
    redis.call('SET', KEYS[1], ARGV[1], 'PX', ttl)
end
return 1
"#;

/// Claim presence pointers for a room, all or nothing.
///
/// A pointer blocks the claim only if it names a different room whose
/// record still exists. Pointers into vanished rooms are overwritten.
///
/// Arguments:
/// - KEYS[1..n]: Pointer keys (`live.User.<id>` / `live.Group.<id>`)
/// - ARGV[1]: Room id to claim for
/// - ARGV[2]: TTL in milliseconds
/// - ARGV[3]: Room key prefix (`live.Room.`)
///
/// Returns:
/// - 0: Claimed
/// - i (1-based): Index of the first conflicting key (nothing written)
pub const CLAIM_POINTERS: &str = r#"
for i, key in ipairs(KEYS) do
    local current = redis.call('GET', key)
    if current and current ~= ARGV[1] then
        if redis.call('EXISTS', ARGV[3] .. current) == 1 then
            return i
        end
    end
end

for _, key in ipairs(KEYS) do
    -- a pointer already promoted for this room stays permanent
    local promoted = redis.call('GET', key) == ARGV[1] and redis.call('PTTL', key) == -1
    if not promoted then
        redis.call('SET', key, ARGV[1], 'PX', ARGV[2])
    end
end
return 0
"#;

/// Drop the TTL of every key, only if all of them exist.
///
/// Arguments:
/// - KEYS[1..n]: Keys to persist
///
/// Returns:
/// - 1: All keys persisted
/// - 0: At least one key missing (nothing changed)
pub const PERSIST_IF_EXISTS: &str = r#"
for _, key in ipairs(KEYS) do
    if redis.call('EXISTS', key) == 0 then
        return 0
    end
end

for _, key in ipairs(KEYS) do
    redis.call('PERSIST', key)
end
return 1
"#;

/// Delete every key whose value equals the expected one.
///
/// Arguments:
/// - KEYS[1..n]: Keys to delete
/// - ARGV[1]: Expected value (room id)
///
/// Returns:
/// - Number of keys deleted
pub const COMPARE_AND_DELETE: &str = r#"
local deleted = 0
for _, key in ipairs(KEYS) do
    if redis.call('GET', key) == ARGV[1] then
        redis.call('DEL', key)
        deleted = deleted + 1
    end
end
return deleted
"#;
