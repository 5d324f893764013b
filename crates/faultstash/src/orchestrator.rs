//! Backup orchestration
//!
//! Walks projects → faults → notices, wiring paginators to upload sessions
//! and the run ledger. Strictly sequential: one outbound call in flight at
//! any instant. Any error aborts the sessions open for the failing project
//! plus the top-level session and halts the run; projects finalized earlier
//! stay committed, and the ledger only advances on a fully successful run.

use chrono::Utc;
use faultstash_core::{Result, RunConfig};
use tracing::info;

use crate::client::ApiClient;
use crate::ledger::RunLedger;
use crate::paginator::Paginator;
use crate::resources::{Fault, FaultPage, NoticePage, PageRequest, PageRoute, Project, ProjectPage};
use crate::storage::ObjectStore;
use crate::transport::ApiTransport;
use crate::uploader::{object_key, UploadSession};

/// Log every notice for small faults, every 100th for large ones.
const NOTICE_LOG_STRIDE: i64 = 100;

/// Drives one backup run end to end.
pub struct BackupOrchestrator<T: ApiTransport, S: ObjectStore> {
    client: ApiClient<T>,
    store: S,
    config: RunConfig,
    ledger: RunLedger,
}

impl<T: ApiTransport, S: ObjectStore> BackupOrchestrator<T, S> {
    pub fn new(config: RunConfig, transport: T, store: S) -> Self {
        let ledger = RunLedger::new(
            config.bucket.clone(),
            config.ledger_key(),
            config.override_timestamp,
        );
        Self {
            client: ApiClient::new(transport),
            store,
            config,
            ledger,
        }
    }

    /// Runs the backup and returns the locations of every committed object.
    pub async fn run(&mut self) -> Result<Vec<String>> {
        info!(
            bucket = %self.config.bucket,
            prefix = %self.config.prefix,
            projects = self.config.include_projects.len(),
            "starting backup run"
        );
        self.sweep_abandoned_uploads().await;

        let mut uploaded = Vec::new();
        let projects_key = object_key(&self.config.prefix, &["projects"], Utc::now());
        let mut projects_session =
            UploadSession::open(&self.store, &self.config.bucket, projects_key).await?;
        let mut projects = Paginator::<ProjectPage>::new(self.page_request(PageRoute::Projects, 0))
            .with_include_set(self.config.include_projects.clone());

        loop {
            let project = match projects.next(&mut self.client).await {
                Ok(Some(project)) => project,
                Ok(None) => break,
                Err(err) => {
                    projects_session.abort(&self.store).await;
                    return Err(err);
                }
            };
            info!(project = %project.name, "backing up");
            if let Err(err) = self
                .backup_project(&project, &mut projects_session, &mut uploaded)
                .await
            {
                projects_session.abort(&self.store).await;
                return Err(err);
            }
        }

        let location = projects_session.finalize(&self.store).await?;
        uploaded.push(location);

        self.ledger.save_next_run(&self.store).await?;
        Ok(uploaded)
    }

    /// Backs up one project into fresh faults/notices sessions, then appends
    /// the project record to the top-level session. On error every session
    /// opened here is aborted before the error propagates; the caller aborts
    /// the top-level session.
    async fn backup_project(
        &mut self,
        project: &Project,
        projects_session: &mut UploadSession,
        uploaded: &mut Vec<String>,
    ) -> Result<()> {
        let faults_key = object_key(&self.config.prefix, &[&project.name, "faults"], Utc::now());
        let mut faults_session =
            UploadSession::open(&self.store, &self.config.bucket, faults_key).await?;
        let notices_key = object_key(&self.config.prefix, &[&project.name, "notices"], Utc::now());
        let mut notices_session =
            match UploadSession::open(&self.store, &self.config.bucket, notices_key).await {
                Ok(session) => session,
                Err(err) => {
                    faults_session.abort(&self.store).await;
                    return Err(err);
                }
            };

        if let Err(err) = self
            .copy_project_records(project, &mut faults_session, &mut notices_session)
            .await
        {
            notices_session.abort(&self.store).await;
            faults_session.abort(&self.store).await;
            return Err(err);
        }

        // Finalize in reverse nesting order: notices, faults, then the
        // project record itself.
        let notices_location = match notices_session.finalize(&self.store).await {
            Ok(location) => location,
            Err(err) => {
                faults_session.abort(&self.store).await;
                return Err(err);
            }
        };
        let faults_location = faults_session.finalize(&self.store).await?;
        projects_session.append(&self.store, project).await?;

        uploaded.push(faults_location);
        uploaded.push(notices_location);
        Ok(())
    }

    async fn copy_project_records(
        &mut self,
        project: &Project,
        faults_session: &mut UploadSession,
        notices_session: &mut UploadSession,
    ) -> Result<()> {
        let since = self
            .ledger
            .previous_timestamp(&self.store, &project.name)
            .await?;

        let mut faults = Paginator::<FaultPage>::new(self.page_request(
            PageRoute::Faults {
                project_id: project.id,
            },
            since,
        ));
        let mut fault_count = 0i64;
        while let Some(fault) = faults.next(&mut self.client).await? {
            fault_count += 1;
            info!(count = fault_count, total = project.fault_count, "faults");
            self.copy_fault_notices(&fault, since, notices_session).await?;
            faults_session.append(&self.store, &fault).await?;
        }
        if fault_count == 0 {
            info!(project = %project.name, "no new faults to back up");
        }
        Ok(())
    }

    async fn copy_fault_notices(
        &mut self,
        fault: &Fault,
        since: i64,
        notices_session: &mut UploadSession,
    ) -> Result<()> {
        let mut notices = Paginator::<NoticePage>::new(self.page_request(
            PageRoute::Notices {
                project_id: fault.project_id,
                fault_id: fault.id,
            },
            since,
        ));
        let mut notice_count = 0usize;
        while notice_count < self.config.notice_limit {
            let Some(notice) = notices.next(&mut self.client).await? else {
                break;
            };
            notice_count += 1;
            if fault.notices_count < NOTICE_LOG_STRIDE
                || notice_count as i64 % NOTICE_LOG_STRIDE == 0
            {
                info!(
                    fault = fault.id,
                    count = notice_count,
                    total = fault.notices_count,
                    "notices"
                );
            }
            notices_session.append(&self.store, &notice).await?;
        }
        Ok(())
    }

    /// Aborts multipart uploads a previous crashed run left behind under
    /// this run's prefix. Best-effort recovery: failures are logged, never
    /// fatal.
    async fn sweep_abandoned_uploads(&self) {
        let pending = match self
            .store
            .list_pending_uploads(&self.config.bucket, &self.config.prefix)
            .await
        {
            Ok(pending) => pending,
            Err(err) => {
                tracing::warn!(error = %err, "could not list abandoned multipart uploads");
                return;
            }
        };
        let found = pending.len();
        let mut cleaned = 0usize;
        for upload in pending {
            match self
                .store
                .abort_multipart_upload(&self.config.bucket, &upload.key, &upload.upload_id)
                .await
            {
                Ok(()) => cleaned += 1,
                Err(err) => {
                    tracing::error!(key = %upload.key, error = %err, "failed to abort abandoned upload");
                }
            }
        }
        if found > 0 {
            info!(found, cleaned, "cleaned up abandoned multipart uploads");
        }
    }

    fn page_request(&self, route: PageRoute, created_after: i64) -> PageRequest {
        PageRequest {
            endpoint: self.config.endpoint.clone(),
            token: self.config.api_key.clone(),
            route,
            created_after,
        }
    }
}
