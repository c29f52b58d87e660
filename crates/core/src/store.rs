//! 저장소 계약: 프로젝트/이슈 저장소와 알림 저장소
//!
//! 영속화 방식은 외부 관심사이므로 여기서는 각 연산이 지켜야 할 계약만 정의합니다.
//! 구현체는 `async fn`으로 trait을 구현하고, 사용하는 쪽은 `Arc<S>` 제네릭으로 받습니다.
//!
//! [`MemoryStore`]는 두 trait을 모두 구현하는 프로세스 내 저장소로,
//! 데몬 기본 구성과 테스트에서 사용합니다.
//!
//! # 원자성
//!
//! [`ProjectStore::commit_scan`]은 프로젝트의 의존성 행, 각 의존성의 이슈 집합, 스캔 집계를
//! 한 번에 교체합니다. 읽는 쪽은 이전 스캔 결과 또는 새 스캔 결과 중 하나만 관찰하며,
//! 중간 상태(이슈가 잠시 비어 있거나 집계만 이전 것인 상태)는 보이지 않습니다.
//! 커밋이 실패하면 직전 성공 스캔의 데이터가 그대로 남습니다.

use std::collections::{BTreeMap, HashMap};
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};

use chrono::{DateTime, Utc};
use tokio::sync::RwLock;

use crate::error::StoreError;
use crate::types::{
    AlertConfig, Dependency, DependencyScan, Ecosystem, Issue, NewNotification, Notification,
    NotificationPage, NotificationQuery, NotificationType, Project, ProjectId, ScanStats,
    UserId, UserProfile,
};

/// 프로젝트/의존성/이슈 저장소
pub trait ProjectStore: Send + Sync + 'static {
    /// 추적 중인 모든 프로젝트
    fn projects(&self) -> impl Future<Output = Result<Vec<Project>, StoreError>> + Send;

    /// 프로젝트 단건 조회
    fn project(
        &self,
        id: ProjectId,
    ) -> impl Future<Output = Result<Option<Project>, StoreError>> + Send;

    /// 프로젝트의 현재 의존성 목록
    fn dependencies(
        &self,
        project_id: ProjectId,
    ) -> impl Future<Output = Result<Vec<Dependency>, StoreError>> + Send;

    /// 의존성과 그 이슈 목록 (프로젝트 리포트용)
    fn dependency_issues(
        &self,
        project_id: ProjectId,
    ) -> impl Future<Output = Result<Vec<(Dependency, Vec<Issue>)>, StoreError>> + Send;

    /// 스캔 결과와 집계를 하나의 원자적 연산으로 커밋합니다.
    ///
    /// 프로젝트(`stats.project_id`)의 의존성과 이슈를 `results`로 교체하고
    /// `stats`를 마지막 스캔 집계로 기록합니다. 새 결과에 없는 의존성은 이슈와 함께
    /// 사라지고, 같은 (name, ecosystem) 의존성은 ID를 유지합니다.
    /// 에러를 반환하면 아무것도 바뀌지 않은 상태여야 합니다.
    fn commit_scan(
        &self,
        stats: ScanStats,
        results: Vec<DependencyScan>,
    ) -> impl Future<Output = Result<(), StoreError>> + Send;

    /// 마지막 성공 스캔 집계
    fn last_scan(
        &self,
        project_id: ProjectId,
    ) -> impl Future<Output = Result<Option<ScanStats>, StoreError>> + Send;
}

/// 알림/알림 설정 저장소
pub trait NotificationStore: Send + Sync + 'static {
    /// 알림을 영속화하고 ID/생성 시각이 채워진 알림을 반환합니다.
    fn append(
        &self,
        notification: NewNotification,
    ) -> impl Future<Output = Result<Notification, StoreError>> + Send;

    /// 사용자 알림 목록 (최신순, 페이지네이션)
    fn notifications(
        &self,
        user_id: UserId,
        query: NotificationQuery,
    ) -> impl Future<Output = Result<NotificationPage, StoreError>> + Send;

    /// 읽지 않은 알림 수
    fn unread_count(&self, user_id: UserId)
    -> impl Future<Output = Result<usize, StoreError>> + Send;

    /// 알림 하나를 읽음 처리합니다. 사용자 소유가 아니거나 없으면 `false`.
    fn mark_read(
        &self,
        user_id: UserId,
        notification_id: &str,
    ) -> impl Future<Output = Result<bool, StoreError>> + Send;

    /// 사용자 알림 전체를 읽음 처리하고 변경된 수를 반환합니다.
    fn mark_all_read(&self, user_id: UserId)
    -> impl Future<Output = Result<usize, StoreError>> + Send;

    /// 다이제스트 후보: 읽지 않았고 발송되지 않았으며 `since` 이후 생성된 알림 (오래된 순)
    fn pending_digest(
        &self,
        user_id: UserId,
        since: Option<DateTime<Utc>>,
        kinds: Vec<NotificationType>,
    ) -> impl Future<Output = Result<Vec<Notification>, StoreError>> + Send;

    /// 다이제스트 발송 마커를 기록합니다 (`read`는 변경하지 않음).
    fn mark_delivered(
        &self,
        ids: Vec<String>,
        at: DateTime<Utc>,
    ) -> impl Future<Output = Result<(), StoreError>> + Send;

    /// 사용자 알림 설정 (없으면 기본값)
    fn alert_config(
        &self,
        user_id: UserId,
    ) -> impl Future<Output = Result<AlertConfig, StoreError>> + Send;

    /// 사용자 알림 설정을 저장합니다.
    fn set_alert_config(
        &self,
        config: AlertConfig,
    ) -> impl Future<Output = Result<(), StoreError>> + Send;

    /// 명시적으로 저장된 모든 알림 설정
    fn alert_configs(&self) -> impl Future<Output = Result<Vec<AlertConfig>, StoreError>> + Send;

    /// 마지막 다이제스트 발송 시각
    fn last_digest_at(
        &self,
        user_id: UserId,
    ) -> impl Future<Output = Result<Option<DateTime<Utc>>, StoreError>> + Send;

    /// 마지막 다이제스트 발송 시각을 기록합니다.
    fn set_last_digest_at(
        &self,
        user_id: UserId,
        at: DateTime<Utc>,
    ) -> impl Future<Output = Result<(), StoreError>> + Send;

    /// 사용자 연락처
    fn user(
        &self,
        user_id: UserId,
    ) -> impl Future<Output = Result<Option<UserProfile>, StoreError>> + Send;
}

#[derive(Default)]
struct MemoryState {
    projects: BTreeMap<ProjectId, Project>,
    dependencies: HashMap<ProjectId, Vec<Dependency>>,
    issues: HashMap<String, Vec<Issue>>,
    scans: HashMap<ProjectId, ScanStats>,
    notifications: Vec<Notification>,
    alert_configs: HashMap<UserId, AlertConfig>,
    last_digest: HashMap<UserId, DateTime<Utc>>,
    users: HashMap<UserId, UserProfile>,
}

/// 프로세스 내 저장소
///
/// 하나의 `RwLock` 아래 모든 상태를 두므로 각 연산이 곧 트랜잭션입니다.
#[derive(Default)]
pub struct MemoryStore {
    state: RwLock<MemoryState>,
    next_project_id: AtomicU64,
}

impl MemoryStore {
    /// 빈 저장소를 생성합니다.
    pub fn new() -> Self {
        Self::default()
    }

    /// 사용자를 등록하거나 갱신합니다.
    pub async fn upsert_user(&self, user: UserProfile) {
        self.state.write().await.users.insert(user.id, user);
    }

    /// 프로젝트를 생성합니다.
    pub async fn create_project(&self, owner_id: UserId, name: impl Into<String>) -> Project {
        let id = self.next_project_id.fetch_add(1, Ordering::Relaxed) + 1;
        let project = Project {
            id,
            owner_id,
            name: name.into(),
        };
        self.state
            .write()
            .await
            .projects
            .insert(id, project.clone());
        project
    }
}

impl ProjectStore for MemoryStore {
    async fn projects(&self) -> Result<Vec<Project>, StoreError> {
        Ok(self.state.read().await.projects.values().cloned().collect())
    }

    async fn project(&self, id: ProjectId) -> Result<Option<Project>, StoreError> {
        Ok(self.state.read().await.projects.get(&id).cloned())
    }

    async fn dependencies(&self, project_id: ProjectId) -> Result<Vec<Dependency>, StoreError> {
        Ok(self
            .state
            .read()
            .await
            .dependencies
            .get(&project_id)
            .cloned()
            .unwrap_or_default())
    }

    async fn dependency_issues(
        &self,
        project_id: ProjectId,
    ) -> Result<Vec<(Dependency, Vec<Issue>)>, StoreError> {
        let state = self.state.read().await;
        let deps = state
            .dependencies
            .get(&project_id)
            .map(Vec::as_slice)
            .unwrap_or_default();
        Ok(deps
            .iter()
            .map(|dep| {
                let issues = state.issues.get(&dep.id).cloned().unwrap_or_default();
                (dep.clone(), issues)
            })
            .collect())
    }

    async fn commit_scan(
        &self,
        stats: ScanStats,
        results: Vec<DependencyScan>,
    ) -> Result<(), StoreError> {
        let project_id = stats.project_id;
        let now = Utc::now();
        let mut state = self.state.write().await;
        if !state.projects.contains_key(&project_id) {
            return Err(StoreError::Query(format!("project {project_id} not found")));
        }

        let old_deps = state.dependencies.remove(&project_id).unwrap_or_default();
        let mut reusable: HashMap<(String, Ecosystem), String> = old_deps
            .iter()
            .map(|d| ((d.name.clone(), d.ecosystem), d.id.clone()))
            .collect();
        for dep in &old_deps {
            state.issues.remove(&dep.id);
        }

        let mut new_deps = Vec::with_capacity(results.len());
        for scan in results {
            let id = reusable
                .remove(&(scan.record.name.clone(), scan.record.ecosystem))
                .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
            let issues = scan
                .issues
                .into_iter()
                .map(|issue| Issue {
                    id: uuid::Uuid::new_v4().to_string(),
                    dependency_id: id.clone(),
                    advisory_id: issue.advisory_id,
                    title: issue.title,
                    description: issue.description,
                    severity: issue.severity,
                    cve_id: issue.cve_id,
                    affected_ranges: issue.affected_ranges,
                    created_at: now,
                })
                .collect();
            state.issues.insert(id.clone(), issues);
            new_deps.push(Dependency {
                id,
                project_id,
                name: scan.record.name,
                version: scan.record.version,
                ecosystem: scan.record.ecosystem,
                latest_version: scan.latest_version,
                updated_at: now,
            });
        }
        state.dependencies.insert(project_id, new_deps);
        state.scans.insert(project_id, stats);
        Ok(())
    }

    async fn last_scan(&self, project_id: ProjectId) -> Result<Option<ScanStats>, StoreError> {
        Ok(self.state.read().await.scans.get(&project_id).cloned())
    }
}

impl NotificationStore for MemoryStore {
    async fn append(&self, notification: NewNotification) -> Result<Notification, StoreError> {
        let stored = Notification {
            id: uuid::Uuid::new_v4().to_string(),
            user_id: notification.user_id,
            kind: notification.kind,
            message: notification.message,
            metadata: notification.metadata,
            read: false,
            delivered_at: None,
            created_at: Utc::now(),
        };
        self.state.write().await.notifications.push(stored.clone());
        Ok(stored)
    }

    async fn notifications(
        &self,
        user_id: UserId,
        query: NotificationQuery,
    ) -> Result<NotificationPage, StoreError> {
        let query = query.normalized();
        let state = self.state.read().await;
        let matching: Vec<&Notification> = state
            .notifications
            .iter()
            .rev()
            .filter(|n| n.user_id == user_id)
            .filter(|n| query.kind.is_none_or(|k| n.kind == k))
            .filter(|n| !query.unread_only || !n.read)
            .collect();
        let total = matching.len();
        let notifications = matching
            .into_iter()
            .skip((query.page - 1).saturating_mul(query.limit))
            .take(query.limit)
            .cloned()
            .collect();
        Ok(NotificationPage {
            notifications,
            total,
            page: query.page,
            limit: query.limit,
        })
    }

    async fn unread_count(&self, user_id: UserId) -> Result<usize, StoreError> {
        Ok(self
            .state
            .read()
            .await
            .notifications
            .iter()
            .filter(|n| n.user_id == user_id && !n.read)
            .count())
    }

    async fn mark_read(&self, user_id: UserId, notification_id: &str) -> Result<bool, StoreError> {
        let mut state = self.state.write().await;
        match state
            .notifications
            .iter_mut()
            .find(|n| n.id == notification_id && n.user_id == user_id)
        {
            Some(n) => {
                n.read = true;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn mark_all_read(&self, user_id: UserId) -> Result<usize, StoreError> {
        let mut state = self.state.write().await;
        let mut changed = 0;
        for n in state
            .notifications
            .iter_mut()
            .filter(|n| n.user_id == user_id && !n.read)
        {
            n.read = true;
            changed += 1;
        }
        Ok(changed)
    }

    async fn pending_digest(
        &self,
        user_id: UserId,
        since: Option<DateTime<Utc>>,
        kinds: Vec<NotificationType>,
    ) -> Result<Vec<Notification>, StoreError> {
        let state = self.state.read().await;
        Ok(state
            .notifications
            .iter()
            .filter(|n| n.user_id == user_id && !n.read && n.delivered_at.is_none())
            .filter(|n| kinds.contains(&n.kind))
            .filter(|n| since.is_none_or(|s| n.created_at > s))
            .cloned()
            .collect())
    }

    async fn mark_delivered(&self, ids: Vec<String>, at: DateTime<Utc>) -> Result<(), StoreError> {
        let mut state = self.state.write().await;
        for n in state
            .notifications
            .iter_mut()
            .filter(|n| ids.contains(&n.id))
        {
            n.delivered_at = Some(at);
        }
        Ok(())
    }

    async fn alert_config(&self, user_id: UserId) -> Result<AlertConfig, StoreError> {
        Ok(self
            .state
            .read()
            .await
            .alert_configs
            .get(&user_id)
            .cloned()
            .unwrap_or_else(|| AlertConfig::default_for(user_id)))
    }

    async fn set_alert_config(&self, config: AlertConfig) -> Result<(), StoreError> {
        self.state
            .write()
            .await
            .alert_configs
            .insert(config.user_id, config);
        Ok(())
    }

    async fn alert_configs(&self) -> Result<Vec<AlertConfig>, StoreError> {
        let state = self.state.read().await;
        let mut configs: Vec<AlertConfig> = state.alert_configs.values().cloned().collect();
        configs.sort_by_key(|c| c.user_id);
        Ok(configs)
    }

    async fn last_digest_at(&self, user_id: UserId) -> Result<Option<DateTime<Utc>>, StoreError> {
        Ok(self.state.read().await.last_digest.get(&user_id).copied())
    }

    async fn set_last_digest_at(
        &self,
        user_id: UserId,
        at: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        self.state.write().await.last_digest.insert(user_id, at);
        Ok(())
    }

    async fn user(&self, user_id: UserId) -> Result<Option<UserProfile>, StoreError> {
        Ok(self.state.read().await.users.get(&user_id).cloned())
    }
}
