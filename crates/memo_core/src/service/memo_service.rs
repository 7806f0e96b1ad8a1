//! Memo use-case service.
//!
//! # Responsibility
//! - Provide create/edit/tag/pin/delete flows over any `MemoRepository`.
//! - Give callers a best-effort startup load with a default-record fallback.
//!
//! # Invariants
//! - Edits always start from the latest stored snapshot and go through a
//!   `with_*` derivation, so `version` and `updated_at` advance together.
//! - Blank tags are rejected before anything is written.

use crate::model::memo::{Memo, MemoId};
use crate::repo::{MemoRepository, RepoError};
use log::warn;
use std::error::Error;
use std::fmt::{Display, Formatter};

/// Title given to the record created when storage is empty or unreadable.
pub const DEFAULT_MEMO_TITLE: &str = "New memo";

/// Service error for memo use-cases.
#[derive(Debug)]
pub enum MemoServiceError {
    /// Tag input contains empty values.
    InvalidTag(String),
    /// Target memo does not exist.
    MemoNotFound(MemoId),
    /// Persistence-layer failure.
    Repo(RepoError),
}

impl Display for MemoServiceError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidTag(value) => write!(f, "invalid tag: `{value}`"),
            Self::MemoNotFound(id) => write!(f, "memo not found: {id}"),
            Self::Repo(err) => write!(f, "{err}"),
        }
    }
}

impl Error for MemoServiceError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Repo(err) => Some(err),
            _ => None,
        }
    }
}

impl From<RepoError> for MemoServiceError {
    fn from(value: RepoError) -> Self {
        match value {
            RepoError::NotFound(id) => Self::MemoNotFound(id),
            other => Self::Repo(other),
        }
    }
}

pub type ServiceResult<T> = Result<T, MemoServiceError>;

/// Memo service facade over repository implementations.
pub struct MemoService<R: MemoRepository> {
    repo: R,
}

impl<R: MemoRepository> MemoService<R> {
    pub fn new(repo: R) -> Self {
        Self { repo }
    }

    pub fn repository(&self) -> &R {
        &self.repo
    }

    /// Creates and persists a new memo.
    pub async fn create(
        &self,
        title: impl Into<String>,
        content: impl Into<String>,
    ) -> ServiceResult<Memo> {
        let memo = Memo::create_new(title, content);
        self.repo.add(&memo).await?;
        Ok(memo)
    }

    pub async fn get(&self, id: MemoId) -> ServiceResult<Memo> {
        self.repo
            .get_by_id(id)
            .await?
            .ok_or(MemoServiceError::MemoNotFound(id))
    }

    /// Replaces content; `preview` is recomputed by the derivation.
    pub async fn edit_content(&self, id: MemoId, content: impl Into<String>) -> ServiceResult<Memo> {
        let content = content.into();
        self.apply(id, move |memo| memo.with_content(content)).await
    }

    pub async fn rename(&self, id: MemoId, title: impl Into<String>) -> ServiceResult<Memo> {
        let title = title.into();
        self.apply(id, move |memo| memo.with_title(title)).await
    }

    /// Replaces the full tag set.
    pub async fn set_tags(&self, id: MemoId, tags: Vec<String>) -> ServiceResult<Memo> {
        if let Some(blank) = tags.iter().find(|tag| tag.trim().is_empty()) {
            return Err(MemoServiceError::InvalidTag(blank.clone()));
        }
        self.apply(id, move |memo| memo.with_tags(&tags)).await
    }

    pub async fn set_pinned(&self, id: MemoId, is_pinned: bool) -> ServiceResult<Memo> {
        self.apply(id, move |memo| memo.with_pinned(is_pinned)).await
    }

    pub async fn delete(&self, id: MemoId) -> ServiceResult<bool> {
        Ok(self.repo.delete(id).await?)
    }

    /// Lists memos carrying `tag` (case-insensitive), in repository order.
    pub async fn list_by_tag(&self, tag: &str) -> ServiceResult<Vec<Memo>> {
        let memos = self.repo.get_all().await?;
        Ok(memos.into_iter().filter(|memo| memo.has_tag(tag)).collect())
    }

    /// Loads every memo; when storage is empty or unreadable, creates one
    /// default memo and returns it instead.
    ///
    /// # Errors
    /// - Only when the default memo itself cannot be written.
    pub async fn load_or_create_default(&self) -> ServiceResult<Vec<Memo>> {
        match self.repo.get_all().await {
            Ok(memos) if !memos.is_empty() => return Ok(memos),
            Ok(_) => {}
            Err(err) => warn!(
                "event=memo_load module=service status=degraded fallback=default_memo error={err}"
            ),
        }
        let memo = self.create(DEFAULT_MEMO_TITLE, "").await?;
        Ok(vec![memo])
    }

    async fn apply(&self, id: MemoId, derive: impl FnOnce(&Memo) -> Memo) -> ServiceResult<Memo> {
        let current = self.get(id).await?;
        let next = derive(&current);
        self.repo.update(&next).await?;
        Ok(next)
    }
}
