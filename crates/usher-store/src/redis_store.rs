//! Redis-backed implementation of the state store.
//!
//! The key layout is shared with every other worker process and must not
//! change:
//! - `meeting_states`: JSON object, meeting URL → last observed join state
//! - `bot_added_in_meeting`: JSON object, bot name → claimed meeting URLs
//! - `bot_api_keys`: hash, bot name → resolved API key
//!
//! The JSON-object keys predate this implementation; to keep them while
//! still getting atomic conditional updates, the decode-mutate-encode for
//! claims runs inside Redis as a Lua script rather than as a client-side
//! read-then-write.

use std::collections::HashMap;

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::{AsyncCommands, Script};
use tracing::{debug, info};

use crate::{
    BOT_API_KEYS_KEY, ClaimOutcome, JoinState, MEETING_STATES_KEY, SWEEP_CLAIMS_KEY, StateStore,
    StoreError,
};

/// Claim a meeting unless its state blocks a claim. The `requested` marker
/// blocks too: another workflow holds the meeting between its claim and its
/// first persisted poll state.
///
/// KEYS[1] = meeting_states, ARGV[1] = meeting URL, ARGV[2] = initial state.
/// Returns the blocking state, or an empty string when the claim succeeded.
const CLAIM_MEETING_LUA: &str = r#"
local raw = redis.call('GET', KEYS[1])
local map = {}
if raw then map = cjson.decode(raw) end
local cur = map[ARGV[1]]
if cur == 'requested' or cur == 'joining' or cur == 'joined' or cur == 'joined_recording' then
  return cur
end
map[ARGV[1]] = ARGV[2]
redis.call('SET', KEYS[1], cjson.encode(map))
return ''
"#;

/// Set one meeting's state inside the JSON object without losing
/// concurrent writes to other meetings.
const SET_MEETING_STATE_LUA: &str = r#"
local raw = redis.call('GET', KEYS[1])
local map = {}
if raw then map = cjson.decode(raw) end
map[ARGV[1]] = ARGV[2]
redis.call('SET', KEYS[1], cjson.encode(map))
return 1
"#;

/// Remove one meeting's state from the JSON object.
const CLEAR_MEETING_STATE_LUA: &str = r#"
local raw = redis.call('GET', KEYS[1])
if not raw then return 0 end
local map = cjson.decode(raw)
map[ARGV[1]] = nil
redis.call('SET', KEYS[1], cjson.encode(map))
return 1
"#;

/// Add a meeting URL to a bot's claimed list if absent.
///
/// KEYS[1] = bot_added_in_meeting, ARGV[1] = bot name, ARGV[2] = URL.
/// Returns 1 when newly added, 0 when already present.
const CLAIM_FOR_SWEEP_LUA: &str = r#"
local raw = redis.call('GET', KEYS[1])
local map = {}
if raw then map = cjson.decode(raw) end
local urls = map[ARGV[1]]
if urls == nil then urls = {} end
for _, u in ipairs(urls) do
  if u == ARGV[2] then return 0 end
end
table.insert(urls, ARGV[2])
map[ARGV[1]] = urls
redis.call('SET', KEYS[1], cjson.encode(map))
return 1
"#;

/// State store backed by a shared Redis instance.
pub struct RedisStore {
    conn: ConnectionManager,
    claim_meeting: Script,
    set_meeting_state: Script,
    clear_meeting_state: Script,
    claim_for_sweep: Script,
}

impl RedisStore {
    /// Connect to Redis at the given URL (e.g. `redis://redis:6379`).
    pub async fn connect(url: &str) -> Result<Self, StoreError> {
        let client = redis::Client::open(url)?;
        let conn = ConnectionManager::new(client).await?;
        info!(url, "connected to shared state store");

        Ok(Self {
            conn,
            claim_meeting: Script::new(CLAIM_MEETING_LUA),
            set_meeting_state: Script::new(SET_MEETING_STATE_LUA),
            clear_meeting_state: Script::new(CLEAR_MEETING_STATE_LUA),
            claim_for_sweep: Script::new(CLAIM_FOR_SWEEP_LUA),
        })
    }

    /// Read and decode the full meeting-states object.
    async fn meeting_states(&self) -> Result<HashMap<String, JoinState>, StoreError> {
        let mut conn = self.conn.clone();
        let raw: Option<String> = conn.get(MEETING_STATES_KEY).await?;
        match raw {
            Some(json) => serde_json::from_str(&json).map_err(|source| StoreError::Corrupt {
                key: MEETING_STATES_KEY.to_string(),
                source,
            }),
            None => Ok(HashMap::new()),
        }
    }
}

#[async_trait]
impl StateStore for RedisStore {
    async fn meeting_state(&self, meeting_url: &str) -> Result<Option<JoinState>, StoreError> {
        Ok(self.meeting_states().await?.remove(meeting_url))
    }

    async fn set_meeting_state(
        &self,
        meeting_url: &str,
        state: JoinState,
    ) -> Result<(), StoreError> {
        let mut conn = self.conn.clone();
        let _: i64 = self
            .set_meeting_state
            .key(MEETING_STATES_KEY)
            .arg(meeting_url)
            .arg(state.as_str())
            .invoke_async(&mut conn)
            .await?;
        debug!(meeting_url, state = %state, "persisted meeting state");
        Ok(())
    }

    async fn clear_meeting_state(&self, meeting_url: &str) -> Result<(), StoreError> {
        let mut conn = self.conn.clone();
        let _: i64 = self
            .clear_meeting_state
            .key(MEETING_STATES_KEY)
            .arg(meeting_url)
            .invoke_async(&mut conn)
            .await?;
        Ok(())
    }

    async fn claim_meeting(
        &self,
        meeting_url: &str,
        initial: JoinState,
    ) -> Result<ClaimOutcome, StoreError> {
        let mut conn = self.conn.clone();
        let blocking: String = self
            .claim_meeting
            .key(MEETING_STATES_KEY)
            .arg(meeting_url)
            .arg(initial.as_str())
            .invoke_async(&mut conn)
            .await?;

        if blocking.is_empty() {
            Ok(ClaimOutcome::Claimed)
        } else {
            Ok(ClaimOutcome::AlreadyActive(JoinState::from(blocking)))
        }
    }

    async fn claim_for_sweep(
        &self,
        bot_name: &str,
        meeting_url: &str,
    ) -> Result<bool, StoreError> {
        let mut conn = self.conn.clone();
        let added: i64 = self
            .claim_for_sweep
            .key(SWEEP_CLAIMS_KEY)
            .arg(bot_name)
            .arg(meeting_url)
            .invoke_async(&mut conn)
            .await?;
        Ok(added == 1)
    }

    async fn cached_credential(&self, bot_name: &str) -> Result<Option<String>, StoreError> {
        let mut conn = self.conn.clone();
        let key: Option<String> = conn.hget(BOT_API_KEYS_KEY, bot_name).await?;
        Ok(key)
    }

    async fn cache_credential(&self, bot_name: &str, api_key: &str) -> Result<(), StoreError> {
        let mut conn = self.conn.clone();
        let _: () = conn.hset(BOT_API_KEYS_KEY, bot_name, api_key).await?;
        Ok(())
    }

    async fn reset(&self) -> Result<(), StoreError> {
        let mut conn = self.conn.clone();
        let _: () = conn
            .del(&[MEETING_STATES_KEY, SWEEP_CLAIMS_KEY][..])
            .await?;
        info!("cold-start reset: cleared meeting states and sweep claims");
        Ok(())
    }
}
