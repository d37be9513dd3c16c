use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Kind of remote object a cleanup target refers to.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum EntityType {
    Friend,
    Group,
    Channel,
    NonFriendChat,
    BotChat,
}

impl EntityType {
    pub fn as_str(&self) -> &'static str {
        match self {
            EntityType::Friend => "friend",
            EntityType::Group => "group",
            EntityType::Channel => "channel",
            EntityType::NonFriendChat => "non_friend_chat",
            EntityType::BotChat => "bot_chat",
        }
    }
}

/// Bulk cleanup action a preview is staged for.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BatchAction {
    DeleteFriends,
    LeaveGroups,
    UnsubscribeChannels,
    CleanupDeletedContacts,
    CleanupNonFriendChats,
    CleanupBotChats,
}

impl BatchAction {
    pub const ALL: [BatchAction; 6] = [
        BatchAction::DeleteFriends,
        BatchAction::LeaveGroups,
        BatchAction::UnsubscribeChannels,
        BatchAction::CleanupDeletedContacts,
        BatchAction::CleanupNonFriendChats,
        BatchAction::CleanupBotChats,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            BatchAction::DeleteFriends => "DELETE_FRIENDS",
            BatchAction::LeaveGroups => "LEAVE_GROUPS",
            BatchAction::UnsubscribeChannels => "UNSUBSCRIBE_CHANNELS",
            BatchAction::CleanupDeletedContacts => "CLEANUP_DELETED_CONTACTS",
            BatchAction::CleanupNonFriendChats => "CLEANUP_NON_FRIEND_CHATS",
            BatchAction::CleanupBotChats => "CLEANUP_BOT_CHATS",
        }
    }

    pub fn parse_action(s: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|a| a.as_str() == s)
    }

    /// Target type this action operates on. `None` means any type is accepted.
    pub fn expected_entity_type(&self) -> Option<EntityType> {
        match self {
            BatchAction::DeleteFriends => Some(EntityType::Friend),
            BatchAction::LeaveGroups => Some(EntityType::Group),
            BatchAction::UnsubscribeChannels => Some(EntityType::Channel),
            BatchAction::CleanupNonFriendChats => Some(EntityType::NonFriendChat),
            BatchAction::CleanupBotChats => Some(EntityType::BotChat),
            BatchAction::CleanupDeletedContacts => None,
        }
    }

    pub fn accepts(&self, entity_type: EntityType) -> bool {
        self.expected_entity_type()
            .map_or(true, |expected| expected == entity_type)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum JobStatus {
    Pending,
    Running,
    Done,
    Failed,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Pending => "PENDING",
            JobStatus::Running => "RUNNING",
            JobStatus::Done => "DONE",
            JobStatus::Failed => "FAILED",
        }
    }

    pub fn parse_status(s: &str) -> Option<Self> {
        match s {
            "PENDING" => Some(JobStatus::Pending),
            "RUNNING" => Some(JobStatus::Running),
            "DONE" => Some(JobStatus::Done),
            "FAILED" => Some(JobStatus::Failed),
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Done | JobStatus::Failed)
    }
}

/// Snapshot of a remote object captured when the preview was built.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct EntityItem {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub access_hash: Option<String>,
    #[serde(rename = "type")]
    pub entity_type: EntityType,
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_deleted: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_used_at: Option<DateTime<Utc>>,
}

impl EntityItem {
    pub fn new(id: impl Into<String>, entity_type: EntityType, title: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            access_hash: None,
            entity_type,
            title: title.into(),
            username: None,
            is_deleted: None,
            last_used_at: None,
        }
    }

    pub fn with_access_hash(mut self, access_hash: impl Into<String>) -> Self {
        self.access_hash = Some(access_hash.into());
        self
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct PreviewResponse {
    pub preview_token: String,
    pub total: usize,
    pub items: Vec<EntityItem>,
    pub warnings: Vec<String>,
    pub expires_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ExecuteResponse {
    pub job_id: Uuid,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct BatchResultItem {
    pub id: String,
    pub title: String,
    #[serde(rename = "type")]
    pub entity_type: EntityType,
    pub ok: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_code: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
}

impl BatchResultItem {
    pub fn success(item: &EntityItem) -> Self {
        Self {
            id: item.id.clone(),
            title: item.title.clone(),
            entity_type: item.entity_type,
            ok: true,
            error_code: None,
            error_message: None,
        }
    }

    pub fn failure(item: &EntityItem, code: String, message: String) -> Self {
        Self {
            id: item.id.clone(),
            title: item.title.clone(),
            entity_type: item.entity_type,
            ok: false,
            error_code: Some(code),
            error_message: Some(message),
        }
    }
}

/// Persisted state of one batch job. Rows are always replaced wholesale.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct BatchJobResult {
    pub job_id: Uuid,
    pub action: BatchAction,
    pub status: JobStatus,
    pub total: usize,
    pub success_count: usize,
    pub failed_count: usize,
    pub started_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<DateTime<Utc>>,
    pub results: Vec<BatchResultItem>,
}

impl BatchJobResult {
    pub fn pending(action: BatchAction, total: usize) -> Self {
        Self {
            job_id: Uuid::new_v4(),
            action,
            status: JobStatus::Pending,
            total,
            success_count: 0,
            failed_count: 0,
            started_at: Utc::now(),
            finished_at: None,
            results: Vec::new(),
        }
    }

    pub fn running(&self) -> Self {
        Self {
            status: JobStatus::Running,
            ..self.clone()
        }
    }

    /// Copy of this record carrying `results`, with the counters recomputed.
    pub fn with_results(&self, results: Vec<BatchResultItem>) -> Self {
        let success_count = results.iter().filter(|r| r.ok).count();
        Self {
            success_count,
            failed_count: results.len() - success_count,
            results,
            ..self.clone()
        }
    }

    pub fn finish(&self, results: Vec<BatchResultItem>, aborted: bool) -> Self {
        let mut done = self.with_results(results);
        done.status = if aborted {
            JobStatus::Failed
        } else {
            JobStatus::Done
        };
        done.finished_at = Some(Utc::now());
        done
    }
}

/// Counters over the recent job window.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct JobStats {
    pub recent_jobs_total: usize,
    pub running_jobs: usize,
    pub done_jobs: usize,
    pub failed_jobs: usize,
    pub success_items_total: usize,
    pub failed_items_total: usize,
}

impl JobStats {
    pub fn from_jobs(jobs: &[BatchJobResult]) -> Self {
        let count = |status: JobStatus| jobs.iter().filter(|j| j.status == status).count();
        Self {
            recent_jobs_total: jobs.len(),
            running_jobs: count(JobStatus::Running),
            done_jobs: count(JobStatus::Done),
            failed_jobs: count(JobStatus::Failed),
            success_items_total: jobs.iter().map(|j| j.success_count).sum(),
            failed_items_total: jobs.iter().map(|j| j.failed_count).sum(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct PreviewStats {
    pub active_preview_tokens: usize,
    pub active_preview_targets: usize,
}
