//! In-memory LTS and SWR fakes

use crate::lts::{LogStream, LtsApi, MappingRule, MappingRuleEntry, LTS_CODES};
use crate::swr::RegistryApi;
use ams_cloud::{RemoteError, RemoteOutcome, RepoTag, Result};
use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Mutex;

#[derive(Default)]
struct LtsState {
    // group id -> stream name -> stream id
    streams: BTreeMap<String, BTreeMap<String, String>>,
    rules: Vec<MappingRuleEntry>,
    associated: HashSet<String>,
    failures: HashMap<&'static str, RemoteError>,
    calls: HashMap<&'static str, usize>,
    next_id: u32,
}

#[derive(Default)]
pub(crate) struct FakeLtsApi {
    state: Mutex<LtsState>,
}

fn code(code: &str) -> RemoteError {
    RemoteError {
        status: 400,
        request_id: "fake".to_string(),
        code: code.to_string(),
        message: code.to_string(),
    }
}

impl FakeLtsApi {
    pub fn new() -> Self {
        Self::default()
    }

    fn with_state<T>(&self, op: &'static str, f: impl FnOnce(&mut LtsState) -> T) -> T {
        let mut state = self.state.lock().unwrap();
        *state.calls.entry(op).or_default() += 1;
        f(&mut state)
    }

    fn injected<T>(&self, op: &'static str) -> Option<RemoteOutcome<T>> {
        let state = self.state.lock().unwrap();
        state
            .failures
            .get(op)
            .cloned()
            .map(|e| LTS_CODES.classify(e))
    }

    /// Every call to `op` fails with `error`
    pub fn fail(&self, op: &'static str, error: RemoteError) {
        self.state.lock().unwrap().failures.insert(op, error);
    }

    /// Make a stream undeletable, as if a log transfer referenced it
    pub fn associate(&self, stream_id: &str) {
        self.state
            .lock()
            .unwrap()
            .associated
            .insert(stream_id.to_string());
    }

    /// Create a stream behind the protocol's back
    pub fn seed_stream(&self, group: &str, name: &str) -> String {
        self.with_state("seed_stream", |state| {
            state.next_id += 1;
            let id = format!("stream-{}", state.next_id);
            state
                .streams
                .entry(group.to_string())
                .or_default()
                .insert(name.to_string(), id.clone());
            id
        })
    }

    pub fn calls(&self, op: &str) -> usize {
        self.state
            .lock()
            .unwrap()
            .calls
            .get(op)
            .copied()
            .unwrap_or(0)
    }

    pub fn stream_count(&self) -> usize {
        self.state
            .lock()
            .unwrap()
            .streams
            .values()
            .map(BTreeMap::len)
            .sum()
    }

    pub fn rule_count(&self) -> usize {
        self.state.lock().unwrap().rules.len()
    }
}

#[async_trait]
impl LtsApi for FakeLtsApi {
    async fn create_stream(
        &self,
        log_group_id: &str,
        stream_name: &str,
        _ttl_in_days: Option<u32>,
    ) -> Result<RemoteOutcome<String>> {
        if let Some(outcome) = self.injected("create_stream") {
            self.with_state("create_stream", |_| ());
            return Ok(outcome);
        }
        Ok(self.with_state("create_stream", |state| {
            let group = state.streams.entry(log_group_id.to_string()).or_default();
            if group.contains_key(stream_name) {
                return LTS_CODES.classify(code("LTS.0205"));
            }
            state.next_id += 1;
            let id = format!("stream-{}", state.next_id);
            state
                .streams
                .entry(log_group_id.to_string())
                .or_default()
                .insert(stream_name.to_string(), id.clone());
            RemoteOutcome::Success(id)
        }))
    }

    async fn list_streams(&self, log_group_id: &str) -> Result<RemoteOutcome<Vec<LogStream>>> {
        Ok(self.with_state("list_streams", |state| {
            let streams = state
                .streams
                .get(log_group_id)
                .map(|group| {
                    group
                        .iter()
                        .map(|(name, id)| LogStream {
                            log_stream_id: id.clone(),
                            log_stream_name: name.clone(),
                        })
                        .collect()
                })
                .unwrap_or_default();
            RemoteOutcome::Success(streams)
        }))
    }

    async fn delete_stream(
        &self,
        log_group_id: &str,
        stream_id: &str,
    ) -> Result<RemoteOutcome<()>> {
        if let Some(outcome) = self.injected("delete_stream") {
            self.with_state("delete_stream", |_| ());
            return Ok(outcome);
        }
        Ok(self.with_state("delete_stream", |state| {
            if state.associated.contains(stream_id) {
                return LTS_CODES.classify(code("LTS.0207"));
            }
            let Some(group) = state.streams.get_mut(log_group_id) else {
                return LTS_CODES.classify(code("LTS.0208"));
            };
            let before = group.len();
            group.retain(|_, id| id != stream_id);
            if group.len() == before {
                LTS_CODES.classify(code("LTS.0208"))
            } else {
                RemoteOutcome::Success(())
            }
        }))
    }

    async fn create_rule(&self, rule: &MappingRule) -> Result<RemoteOutcome<String>> {
        if let Some(outcome) = self.injected("create_rule") {
            self.with_state("create_rule", |_| ());
            return Ok(outcome);
        }
        Ok(self.with_state("create_rule", |state| {
            if state.rules.iter().any(|r| r.rule_name == rule.rule_name) {
                return LTS_CODES.classify(code("LTS.0740"));
            }
            state.next_id += 1;
            let id = format!("rule-{}", state.next_id);
            state.rules.push(MappingRuleEntry {
                rule_id: id.clone(),
                rule_name: rule.rule_name.clone(),
                rule_info: rule.rule_info.clone(),
            });
            RemoteOutcome::Success(id)
        }))
    }

    async fn list_rules(
        &self,
        _log_group_name: &str,
        stream_name: &str,
    ) -> Result<RemoteOutcome<Vec<MappingRuleEntry>>> {
        Ok(self.with_state("list_rules", |state| {
            let rules = state
                .rules
                .iter()
                .filter(|r| {
                    r.rule_info
                        .files
                        .iter()
                        .any(|f| f.log_stream_info.target_log_stream_name == stream_name)
                })
                .cloned()
                .collect();
            RemoteOutcome::Success(rules)
        }))
    }

    async fn delete_rule(&self, rule_id: &str) -> Result<RemoteOutcome<()>> {
        if let Some(outcome) = self.injected("delete_rule") {
            self.with_state("delete_rule", |_| ());
            return Ok(outcome);
        }
        Ok(self.with_state("delete_rule", |state| {
            let before = state.rules.len();
            state.rules.retain(|r| r.rule_id != rule_id);
            if state.rules.len() == before {
                LTS_CODES.classify(code("LTS.0745"))
            } else {
                RemoteOutcome::Success(())
            }
        }))
    }
}

/// Registry holding one repository per name
#[derive(Default)]
pub(crate) struct FakeRegistry {
    repos: Mutex<HashMap<String, Vec<RepoTag>>>,
}

impl FakeRegistry {
    pub fn with_repo(self, name: &str, tags: Vec<RepoTag>) -> Self {
        self.repos.lock().unwrap().insert(name.to_string(), tags);
        self
    }
}

#[async_trait]
impl RegistryApi for FakeRegistry {
    async fn image_count(&self, _namespace: &str, repository: &str) -> Result<RemoteOutcome<i64>> {
        let repos = self.repos.lock().unwrap();
        Ok(match repos.get(repository) {
            Some(tags) => RemoteOutcome::Success(tags.len() as i64),
            None => RemoteOutcome::NotFound(RemoteError {
                status: 404,
                ..RemoteError::default()
            }),
        })
    }

    async fn list_tags(
        &self,
        _namespace: &str,
        repository: &str,
        limit: u32,
        offset: u32,
    ) -> Result<RemoteOutcome<Vec<RepoTag>>> {
        let repos = self.repos.lock().unwrap();
        let mut tags = repos.get(repository).cloned().unwrap_or_default();
        tags.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
        Ok(RemoteOutcome::Success(
            tags.into_iter()
                .skip(offset as usize)
                .take(limit as usize)
                .collect(),
        ))
    }
}
