//! registry keeps users and their passports in a one-to-one association persisted in
//! [Redb](https://github.com/cberner/redb).
//!
//! Each user owns at most one passport, each passport belongs to exactly one user and passport
//! numbers are unique. Every write runs as a single redb transaction: the resolver decides whether
//! the passport is created, reused, updated in place or deleted as an orphan, the orchestrator
//! stamps timestamps and persists both records atomically, and the mapper turns the result into
//! views that never expand the passport's back-reference.
//!

pub mod codec;
pub mod error;
pub mod logger;
pub mod mapper;
pub mod model;
pub mod orchestrator;
pub mod resolver;
pub mod retry;
pub mod service;
pub mod settings;
pub mod storage;

pub use error::{AppError, ErrorKind};
pub use mapper::{from_view, to_view, PassportView, UserView};
pub use model::{Passport, PassportId, PassportRequest, User, UserAttributes, UserId};
pub use resolver::{resolve, LinkAction, PassportLookup, Resolution};
pub use retry::retry_with_delay;
pub use service::UserService;
pub use settings::RegistryConfig;
pub use storage::{AssociationStore, RecordReader, Storage};
