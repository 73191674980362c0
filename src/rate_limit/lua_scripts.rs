/// Lua script for multi-rule sliding window rate limiting
///
/// Checks every window first and only records the request when none of
/// them is full, so a request is counted against all of its rules or none.
///
/// KEYS[i]       = window key of rule i
/// ARGV[1]       = current timestamp (microseconds since epoch)
/// ARGV[2]       = unique member for this request
/// ARGV[2i + 1]  = window duration of rule i (seconds)
/// ARGV[2i + 2]  = maximum requests of rule i
///
/// Returns: [limited (0/1), binding rule (1-based), remaining, reset_after]
pub const SLIDING_WINDOW_SCRIPT: &str = r#"
local now = tonumber(ARGV[1])
local member = ARGV[2]

local binding = 0
local min_remaining = -1
local binding_reset = 0

-- Evaluate every window before writing anything
for i = 1, #KEYS do
    local window = tonumber(ARGV[2 * i + 1])
    local max_requests = tonumber(ARGV[2 * i + 2])
    local window_micros = window * 1000000

    redis.call('ZREMRANGEBYSCORE', KEYS[i], '-inf', now - window_micros)
    local count = redis.call('ZCARD', KEYS[i])

    if count >= max_requests then
        local retry_after = window
        local oldest = redis.call('ZRANGE', KEYS[i], 0, 0, 'WITHSCORES')
        if oldest[2] then
            retry_after = math.ceil((tonumber(oldest[2]) + window_micros - now) / 1000000)
        end
        return {1, i, 0, math.max(1, retry_after)}
    end

    local remaining = max_requests - count - 1
    if min_remaining < 0 or remaining < min_remaining then
        min_remaining = remaining
        binding = i
        binding_reset = window
    end
end

-- Record the request in every window
for i = 1, #KEYS do
    redis.call('ZADD', KEYS[i], now, member)
    redis.call('EXPIRE', KEYS[i], tonumber(ARGV[2 * i + 1]))
end

return {0, binding, min_remaining, binding_reset}
"#;
