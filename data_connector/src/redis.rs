//! Redis registry storage.
//!
//! Key layout:
//! - `{prefix}:servers`: hash of server name -> JSON `StoredServer`
//! - `{prefix}:tools:{server}`: hash of tool name -> "1" | "0"
//!
//! Multi-key mutations run as Lua scripts or MULTI/EXEC pipelines so a
//! failure never leaves a half-written registration behind.

use std::collections::HashMap;

use async_trait::async_trait;
use deadpool_redis::{Config, Connection, Pool, Runtime};
use redis::AsyncCommands;

use crate::{
    config::RedisConfig,
    core::{RegistryStorage, StorageError, StorageResult, StoredServer, ToolState},
};

// KEYS[1] servers hash, KEYS[2] tools hash; ARGV[1] name, ARGV[2] json, then tool/flag pairs
const CREATE_SERVER_LUA: &str = r#"
if redis.call('HSETNX', KEYS[1], ARGV[1], ARGV[2]) == 0 then
  return 0
end
redis.call('DEL', KEYS[2])
for i = 3, #ARGV, 2 do
  redis.call('HSET', KEYS[2], ARGV[i], ARGV[i + 1])
end
return 1
"#;

// KEYS[1] servers hash, KEYS[2] tools hash; ARGV[1] name, then tool/flag pairs
const REPLACE_TOOLS_LUA: &str = r#"
if redis.call('HEXISTS', KEYS[1], ARGV[1]) == 0 then
  return 0
end
redis.call('DEL', KEYS[2])
for i = 2, #ARGV, 2 do
  redis.call('HSET', KEYS[2], ARGV[i], ARGV[i + 1])
end
return 1
"#;

// KEYS[1] servers hash; ARGV[1] tools key prefix, then server/tool/flag triples.
// Returns the first unknown server name, or "" on success.
const SET_TOOLS_LUA: &str = r#"
for i = 2, #ARGV, 3 do
  if redis.call('HEXISTS', KEYS[1], ARGV[i]) == 0 then
    return ARGV[i]
  end
end
for i = 2, #ARGV, 3 do
  redis.call('HSET', ARGV[1] .. ARGV[i], ARGV[i + 1], ARGV[i + 2])
end
return ''
"#;

pub struct RedisRegistryStorage {
    pool: Pool,
    prefix: String,
}

impl RedisRegistryStorage {
    pub fn new(config: &RedisConfig) -> Result<Self, String> {
        let mut cfg = Config::from_url(config.url.clone());
        cfg.pool = Some(deadpool_redis::PoolConfig::new(config.pool_max));
        let pool = cfg
            .create_pool(Some(Runtime::Tokio1))
            .map_err(|e| e.to_string())?;
        Ok(Self {
            pool,
            prefix: config.key_prefix.clone(),
        })
    }

    fn servers_key(&self) -> String {
        format!("{}:servers", self.prefix)
    }

    fn tools_key_prefix(&self) -> String {
        format!("{}:tools:", self.prefix)
    }

    fn tools_key(&self, server: &str) -> String {
        format!("{}{server}", self.tools_key_prefix())
    }

    async fn conn(&self) -> StorageResult<Connection> {
        self.pool.get().await.map_err(backend)
    }
}

fn backend(e: impl std::fmt::Display) -> StorageError {
    StorageError::Backend(e.to_string())
}

fn flag(enabled: bool) -> &'static str {
    if enabled {
        "1"
    } else {
        "0"
    }
}

fn decode_flags(server: &str, raw: HashMap<String, String>) -> Vec<ToolState> {
    let mut states: Vec<ToolState> = raw
        .into_iter()
        .map(|(tool, v)| ToolState::new(server, tool, v == "1"))
        .collect();
    states.sort_by(|a, b| a.tool_name.cmp(&b.tool_name));
    states
}

#[async_trait]
impl RegistryStorage for RedisRegistryStorage {
    async fn create_server(
        &self,
        server: StoredServer,
        tools: Vec<ToolState>,
    ) -> StorageResult<()> {
        let json = serde_json::to_string(&server)?;
        let mut conn = self.conn().await?;

        let script = redis::Script::new(CREATE_SERVER_LUA);
        let mut invocation = script.key(self.servers_key());
        invocation
            .key(self.tools_key(&server.name))
            .arg(&server.name)
            .arg(json);
        for t in tools.iter().filter(|t| t.server_name == server.name) {
            invocation.arg(&t.tool_name).arg(flag(t.enabled));
        }

        let created: i64 = invocation
            .invoke_async(&mut conn)
            .await
            .map_err(backend)?;
        if created == 0 {
            return Err(StorageError::AlreadyExists(server.name));
        }
        Ok(())
    }

    async fn delete_server(&self, name: &str) -> StorageResult<bool> {
        let mut conn = self.conn().await?;
        let (removed, _): (usize, usize) = redis::pipe()
            .atomic()
            .hdel(self.servers_key(), name)
            .del(self.tools_key(name))
            .query_async(&mut conn)
            .await
            .map_err(backend)?;
        Ok(removed > 0)
    }

    async fn get_server(&self, name: &str) -> StorageResult<Option<StoredServer>> {
        let mut conn = self.conn().await?;
        let raw: Option<String> = conn
            .hget(self.servers_key(), name)
            .await
            .map_err(backend)?;
        raw.map(|s| serde_json::from_str(&s).map_err(StorageError::from))
            .transpose()
    }

    async fn list_servers(&self) -> StorageResult<Vec<StoredServer>> {
        let mut conn = self.conn().await?;
        let raw: HashMap<String, String> =
            conn.hgetall(self.servers_key()).await.map_err(backend)?;
        let mut servers = raw
            .values()
            .map(|s| serde_json::from_str::<StoredServer>(s))
            .collect::<Result<Vec<_>, _>>()?;
        servers.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(servers)
    }

    async fn list_tool_states(&self, server_name: Option<&str>) -> StorageResult<Vec<ToolState>> {
        let mut conn = self.conn().await?;
        let names: Vec<String> = match server_name {
            Some(name) => vec![name.to_string()],
            None => {
                let mut names: Vec<String> =
                    conn.hkeys(self.servers_key()).await.map_err(backend)?;
                names.sort();
                names
            }
        };
        if names.is_empty() {
            return Ok(Vec::new());
        }

        let mut pipe = redis::pipe();
        for name in &names {
            pipe.hgetall(self.tools_key(name));
        }
        let results: Vec<HashMap<String, String>> =
            pipe.query_async(&mut conn).await.map_err(backend)?;

        Ok(names
            .iter()
            .zip(results)
            .flat_map(|(name, raw)| decode_flags(name, raw))
            .collect())
    }

    async fn set_tool_states(&self, states: Vec<ToolState>) -> StorageResult<()> {
        if states.is_empty() {
            return Ok(());
        }
        let mut conn = self.conn().await?;
        let script = redis::Script::new(SET_TOOLS_LUA);
        let mut invocation = script.key(self.servers_key());
        invocation.arg(self.tools_key_prefix());
        for s in &states {
            invocation
                .arg(&s.server_name)
                .arg(&s.tool_name)
                .arg(flag(s.enabled));
        }
        let unknown: String = invocation
            .invoke_async(&mut conn)
            .await
            .map_err(backend)?;
        if !unknown.is_empty() {
            return Err(StorageError::NotFound(unknown));
        }
        Ok(())
    }

    async fn replace_tool_states(
        &self,
        server_name: &str,
        states: Vec<ToolState>,
    ) -> StorageResult<()> {
        let mut conn = self.conn().await?;
        let script = redis::Script::new(REPLACE_TOOLS_LUA);
        let mut invocation = script.key(self.servers_key());
        invocation.key(self.tools_key(server_name)).arg(server_name);
        for s in states.iter().filter(|s| s.server_name == server_name) {
            invocation.arg(&s.tool_name).arg(flag(s.enabled));
        }
        let replaced: i64 = invocation
            .invoke_async(&mut conn)
            .await
            .map_err(backend)?;
        if replaced == 0 {
            return Err(StorageError::NotFound(server_name.to_string()));
        }
        Ok(())
    }
}
