use crate::mapper::{into_request, to_view, UserView};
use crate::model::UserId;
use crate::orchestrator;
use crate::settings::RegistryConfig;
use crate::storage::{ReadCtx, Storage, WriteCtx};
use crate::{error, info, warn, AppError, ErrorKind};
use chrono::Utc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Entry point for transports: every call is one store transaction bounded by `op_timeout`.
#[derive(Clone)]
pub struct UserService {
    storage: Arc<Storage>,
    op_timeout: Duration,
}

fn report(op: &str, err: &AppError) {
    match err.kind() {
        ErrorKind::StoreUnavailable => error!("{} failed, store unavailable: {}", op, err),
        _ => warn!("{} rejected: {}", op, err),
    }
}

impl UserService {
    pub fn new(storage: Arc<Storage>, op_timeout: Duration) -> Self {
        UserService { storage, op_timeout }
    }

    pub fn from_config(config: &RegistryConfig) -> Result<Self, AppError> {
        let storage = Storage::open(&config.store)?;
        Ok(Self::new(storage, config.store.op_timeout))
    }

    /// Runs `f` inside a write transaction on the blocking pool. Nothing is committed
    /// once the caller has been told the operation timed out.
    async fn write<T, F>(&self, op: &'static str, f: F) -> Result<T, AppError>
    where
        T: Send + 'static,
        F: FnOnce(&mut WriteCtx) -> Result<T, AppError> + Send + 'static,
    {
        let storage = Arc::clone(&self.storage);
        let timeout = self.op_timeout;
        let abandoned = Arc::new(AtomicBool::new(false));
        let abandoned_flag = Arc::clone(&abandoned);
        let task = tokio::task::spawn_blocking(move || -> Result<T, AppError> {
            let mut ctx = storage.begin_write_ctx()?;
            match f(&mut ctx) {
                Ok(value) if !abandoned_flag.load(Ordering::SeqCst) => {
                    ctx.commit()?;
                    Ok(value)
                }
                Ok(_) => {
                    ctx.abort()?;
                    Err(AppError::Timeout(timeout))
                }
                Err(err) => {
                    if let Err(abort_err) = ctx.abort() {
                        error!("Aborting {} failed: {}", op, abort_err);
                    }
                    Err(err)
                }
            }
        });
        let result = match tokio::time::timeout(timeout, task).await {
            Ok(joined) => joined.map_err(AppError::from).and_then(|r| r),
            Err(_) => {
                abandoned.store(true, Ordering::SeqCst);
                Err(AppError::Timeout(timeout))
            }
        };
        if let Err(err) = &result {
            report(op, err);
        }
        result
    }

    async fn read<T, F>(&self, op: &'static str, f: F) -> Result<T, AppError>
    where
        T: Send + 'static,
        F: FnOnce(&ReadCtx) -> Result<T, AppError> + Send + 'static,
    {
        let storage = Arc::clone(&self.storage);
        let task = tokio::task::spawn_blocking(move || {
            let ctx = storage.begin_read_ctx()?;
            f(&ctx)
        });
        let result = match tokio::time::timeout(self.op_timeout, task).await {
            Ok(joined) => joined.map_err(AppError::from).and_then(|r| r),
            Err(_) => Err(AppError::Timeout(self.op_timeout)),
        };
        if let Err(err) = &result {
            report(op, err);
        }
        result
    }

    /// Creates a user when `id` is absent, otherwise updates the existing one.
    pub async fn create_or_update(&self, id: Option<UserId>, view: UserView) -> Result<UserView, AppError> {
        let (attributes, request) = into_request(view);
        let upserted = self
            .write("create_or_update", move |ctx| orchestrator::create_or_update(ctx, id, attributes, request, Utc::now()))
            .await?;
        info!("User {:?} saved, passport {:?}", upserted.user.id, upserted.action);
        Ok(to_view(&upserted.user))
    }

    /// Creates a user, failing with `AlreadyExists` if the view names an existing id.
    pub async fn create(&self, view: UserView) -> Result<UserView, AppError> {
        let requested_id = view.id;
        let (attributes, request) = into_request(view);
        let created = self
            .write("create", move |ctx| orchestrator::create(ctx, requested_id, attributes, request, Utc::now()))
            .await?;
        info!("User {:?} created, passport {:?}", created.user.id, created.action);
        Ok(to_view(&created.user))
    }

    pub async fn update(&self, id: UserId, view: UserView) -> Result<UserView, AppError> {
        self.create_or_update(Some(id), view).await
    }

    pub async fn delete(&self, id: UserId) -> Result<(), AppError> {
        self.write("delete", move |ctx| orchestrator::delete(ctx, id)).await?;
        info!("User {} deleted", id);
        Ok(())
    }

    pub async fn get(&self, id: UserId) -> Result<UserView, AppError> {
        let user = self.read("get", move |ctx| orchestrator::get(ctx, id)).await?;
        Ok(to_view(&user))
    }

    pub async fn list(&self) -> Result<Vec<UserView>, AppError> {
        let users = self.read("list", |ctx| orchestrator::list(ctx)).await?;
        Ok(users.iter().map(to_view).collect())
    }

    pub async fn list_with_passports(&self) -> Result<Vec<UserView>, AppError> {
        let users = self.read("list_with_passports", |ctx| orchestrator::list_with_passports(ctx)).await?;
        Ok(users.iter().map(to_view).collect())
    }
}
