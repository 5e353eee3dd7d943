use crate::codec::{decode, encode, PassportRow, UserRow};
use crate::model::{Passport, PassportId, User, UserId};
use crate::resolver::PassportLookup;
use crate::settings::StoreSettings;
use crate::{debug, info, AppError};
use redb::{Database, ReadOnlyTable, ReadTransaction, ReadableTable, Table, TableDefinition, WriteTransaction};
use std::sync::Arc;
use std::{env, fs};

const USERS: TableDefinition<u64, &[u8]> = TableDefinition::new("USERS");
const PASSPORTS: TableDefinition<u64, &[u8]> = TableDefinition::new("PASSPORTS");
const PASSPORT_BY_NUMBER: TableDefinition<&str, u64> = TableDefinition::new("PASSPORT_BY_NUMBER");
const PASSPORT_BY_OWNER: TableDefinition<u64, u64> = TableDefinition::new("PASSPORT_BY_OWNER");
const SEQUENCES: TableDefinition<&str, u64> = TableDefinition::new("SEQUENCES");

const USER_SEQUENCE: &str = "users";
const PASSPORT_SEQUENCE: &str = "passports";

/// Read access shared by read-only and read-write transactions.
pub trait RecordReader {
    fn find_user_by_id(&self, id: UserId) -> Result<Option<User>, AppError>;
    fn list_users(&self) -> Result<Vec<User>, AppError>;
}

/// Transactional record store the orchestrator writes through. Every mutation
/// happens inside one transaction that is either committed or aborted as a whole.
pub trait AssociationStore: RecordReader + PassportLookup {
    /// Persists `user` and its current passport, assigning ids on first save.
    /// `orphans` are passports dissociated by the caller, deleted in the same unit.
    fn save_atomic(&mut self, user: &User, orphans: &[PassportId]) -> Result<User, AppError>;

    /// Removes the user together with the passport it owns, false if it did not exist.
    fn delete_user_by_id(&mut self, id: UserId) -> Result<bool, AppError>;
}

pub struct Storage {
    db: Database,
}

impl Storage {
    pub fn open(settings: &StoreSettings) -> Result<Arc<Storage>, AppError> {
        if let Some(parent) = settings.db_path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                fs::create_dir_all(parent)?;
            }
        }
        info!("Opening registry db at {:?}", settings.db_path);
        let db = Database::builder()
            .set_cache_size(settings.db_cache_size_mb * 1024 * 1024)
            .create(&settings.db_path)?;
        Self::init(db)
    }

    pub fn temp(name: &str) -> Result<Arc<Storage>, AppError> {
        let dir = env::temp_dir().join("registry").join("test");
        if !dir.exists() {
            fs::create_dir_all(&dir)?;
        }
        let db = Database::create(dir.join(format!("{}_{}.redb", name, rand::random::<u64>())))?;
        Self::init(db)
    }

    fn init(db: Database) -> Result<Arc<Storage>, AppError> {
        let tx = db.begin_write()?;
        {
            tx.open_table(USERS)?;
            tx.open_table(PASSPORTS)?;
            tx.open_table(PASSPORT_BY_NUMBER)?;
            tx.open_table(PASSPORT_BY_OWNER)?;
            tx.open_table(SEQUENCES)?;
        }
        tx.commit()?;
        Ok(Arc::new(Storage { db }))
    }

    /// Blocks while another write transaction is open, redb admits a single writer.
    pub fn begin_write_ctx(&self) -> Result<WriteCtx, AppError> {
        Ok(WriteCtx { tx: self.db.begin_write()? })
    }

    pub fn begin_read_ctx(&self) -> Result<ReadCtx, AppError> {
        Ok(ReadCtx { tx: self.db.begin_read()? })
    }
}

fn load_passport<P>(passports: &P, id: u64) -> Result<Option<PassportRow>, AppError>
where
    P: ReadableTable<u64, &'static [u8]>,
{
    match passports.get(id)? {
        Some(guard) => Ok(Some(decode(guard.value())?)),
        None => Ok(None),
    }
}

fn owned_passport<P, O>(passports: &P, by_owner: &O, owner: UserId) -> Result<Option<Passport>, AppError>
where
    P: ReadableTable<u64, &'static [u8]>,
    O: ReadableTable<u64, u64>,
{
    let passport_id = match by_owner.get(owner.0)? {
        Some(guard) => guard.value(),
        None => return Ok(None),
    };
    Ok(load_passport(passports, passport_id)?.map(|row| row.into_passport(PassportId(passport_id))))
}

fn load_user<U, P, O>(users: &U, passports: &P, by_owner: &O, id: UserId) -> Result<Option<User>, AppError>
where
    U: ReadableTable<u64, &'static [u8]>,
    P: ReadableTable<u64, &'static [u8]>,
    O: ReadableTable<u64, u64>,
{
    let row: UserRow = match users.get(id.0)? {
        Some(guard) => decode(guard.value())?,
        None => return Ok(None),
    };
    let passport = owned_passport(passports, by_owner, id)?;
    Ok(Some(row.into_user(id, passport)))
}

fn load_users<U, P, O>(users: &U, passports: &P, by_owner: &O) -> Result<Vec<User>, AppError>
where
    U: ReadableTable<u64, &'static [u8]>,
    P: ReadableTable<u64, &'static [u8]>,
    O: ReadableTable<u64, u64>,
{
    let mut result = Vec::new();
    for entry in users.iter()? {
        let (key, value) = entry?;
        let id = UserId(key.value());
        let row: UserRow = decode(value.value())?;
        let passport = owned_passport(passports, by_owner, id)?;
        result.push(row.into_user(id, passport));
    }
    Ok(result)
}

struct WriteTables<'txn> {
    users: Table<'txn, u64, &'static [u8]>,
    passports: Table<'txn, u64, &'static [u8]>,
    by_number: Table<'txn, &'static str, u64>,
    by_owner: Table<'txn, u64, u64>,
    sequences: Table<'txn, &'static str, u64>,
}

impl<'txn> WriteTables<'txn> {
    fn open(tx: &'txn WriteTransaction) -> Result<Self, AppError> {
        Ok(WriteTables {
            users: tx.open_table(USERS)?,
            passports: tx.open_table(PASSPORTS)?,
            by_number: tx.open_table(PASSPORT_BY_NUMBER)?,
            by_owner: tx.open_table(PASSPORT_BY_OWNER)?,
            sequences: tx.open_table(SEQUENCES)?,
        })
    }

    fn next_id(&mut self, sequence: &str) -> Result<u64, AppError> {
        let next = self.sequences.get(sequence)?.map(|guard| guard.value()).unwrap_or(0) + 1;
        self.sequences.insert(sequence, next)?;
        Ok(next)
    }

    fn owned_passport_id(&self, owner: UserId) -> Result<Option<PassportId>, AppError> {
        Ok(self.by_owner.get(owner.0)?.map(|guard| PassportId(guard.value())))
    }

    fn number_holder(&self, number: &str) -> Result<Option<PassportId>, AppError> {
        Ok(self.by_number.get(number)?.map(|guard| PassportId(guard.value())))
    }

    /// Index entries are only dropped while they still point at `id`.
    fn unindex(&mut self, id: PassportId, row: &PassportRow) -> Result<(), AppError> {
        if self.number_holder(&row.number)? == Some(id) {
            self.by_number.remove(row.number.as_str())?;
        }
        if self.owned_passport_id(UserId(row.owner))? == Some(id) {
            self.by_owner.remove(row.owner)?;
        }
        Ok(())
    }

    fn remove_passport(&mut self, id: PassportId) -> Result<bool, AppError> {
        let row: PassportRow = match self.passports.remove(id.0)? {
            Some(guard) => decode(guard.value())?,
            None => return Ok(false),
        };
        self.unindex(id, &row)?;
        debug!("Removed passport {} ({})", id, row.number);
        Ok(true)
    }

    fn store_passport(&mut self, passport: &Passport, owner: UserId) -> Result<Passport, AppError> {
        if let Some(back_ref) = passport.owner {
            if back_ref != owner {
                return Err(AppError::RelationshipConflict(format!(
                    "passport {} points to user {}, not to user {}",
                    passport.number, back_ref, owner
                )));
            }
        }
        // a user owns at most one passport, the displaced one is orphaned and purged
        if let Some(previous) = self.owned_passport_id(owner)? {
            if Some(previous) != passport.id {
                self.remove_passport(previous)?;
            }
        }
        let id = match passport.id {
            Some(id) => id,
            None => PassportId(self.next_id(PASSPORT_SEQUENCE)?),
        };
        if let Some(holder) = self.number_holder(&passport.number)? {
            if holder != id {
                return Err(AppError::RelationshipConflict(format!(
                    "passport number {} is already registered",
                    passport.number
                )));
            }
        }
        if let Some(existing) = load_passport(&self.passports, id.0)? {
            self.unindex(id, &existing)?;
        }
        let row = PassportRow::from_passport(passport, owner)?;
        self.passports.insert(id.0, encode(&row)?.as_slice())?;
        self.by_number.insert(row.number.as_str(), id.0)?;
        self.by_owner.insert(owner.0, id.0)?;
        Ok(row.into_passport(id))
    }
}

pub struct WriteCtx {
    tx: WriteTransaction,
}

impl WriteCtx {
    pub fn commit(self) -> Result<(), AppError> {
        self.tx.commit()?;
        Ok(())
    }

    pub fn abort(self) -> Result<(), AppError> {
        self.tx.abort()?;
        Ok(())
    }
}

impl RecordReader for WriteCtx {
    fn find_user_by_id(&self, id: UserId) -> Result<Option<User>, AppError> {
        let tables = WriteTables::open(&self.tx)?;
        load_user(&tables.users, &tables.passports, &tables.by_owner, id)
    }

    fn list_users(&self) -> Result<Vec<User>, AppError> {
        let tables = WriteTables::open(&self.tx)?;
        load_users(&tables.users, &tables.passports, &tables.by_owner)
    }
}

impl PassportLookup for WriteCtx {
    /// A passport whose owner row is gone is reported without an owner so it can be re-attached.
    fn find_passport_by_number(&self, number: &str) -> Result<Option<Passport>, AppError> {
        let tables = WriteTables::open(&self.tx)?;
        let id = match tables.number_holder(number)? {
            Some(id) => id,
            None => return Ok(None),
        };
        let row = match load_passport(&tables.passports, id.0)? {
            Some(row) => row,
            None => return Ok(None),
        };
        let owner_exists = tables.users.get(row.owner)?.is_some();
        let mut passport = row.into_passport(id);
        if !owner_exists {
            passport.owner = None;
        }
        Ok(Some(passport))
    }
}

impl AssociationStore for WriteCtx {
    fn save_atomic(&mut self, user: &User, orphans: &[PassportId]) -> Result<User, AppError> {
        let mut tables = WriteTables::open(&self.tx)?;
        for orphan in orphans {
            tables.remove_passport(*orphan)?;
        }
        let user_id = match user.id {
            Some(id) => id,
            None => UserId(tables.next_id(USER_SEQUENCE)?),
        };
        tables.users.insert(user_id.0, encode(&UserRow::from_user(user)?)?.as_slice())?;
        let passport = match &user.passport {
            Some(passport) => Some(tables.store_passport(passport, user_id)?),
            None => {
                if let Some(previous) = tables.owned_passport_id(user_id)? {
                    tables.remove_passport(previous)?;
                }
                None
            }
        };
        Ok(User { id: Some(user_id), passport, ..user.clone() })
    }

    fn delete_user_by_id(&mut self, id: UserId) -> Result<bool, AppError> {
        let mut tables = WriteTables::open(&self.tx)?;
        if tables.users.remove(id.0)?.is_none() {
            return Ok(false);
        }
        if let Some(passport_id) = tables.owned_passport_id(id)? {
            tables.remove_passport(passport_id)?;
        }
        Ok(true)
    }
}

struct ReadTables {
    users: ReadOnlyTable<u64, &'static [u8]>,
    passports: ReadOnlyTable<u64, &'static [u8]>,
    by_owner: ReadOnlyTable<u64, u64>,
}

pub struct ReadCtx {
    tx: ReadTransaction,
}

impl ReadCtx {
    fn tables(&self) -> Result<ReadTables, AppError> {
        Ok(ReadTables {
            users: self.tx.open_table(USERS)?,
            passports: self.tx.open_table(PASSPORTS)?,
            by_owner: self.tx.open_table(PASSPORT_BY_OWNER)?,
        })
    }
}

impl RecordReader for ReadCtx {
    fn find_user_by_id(&self, id: UserId) -> Result<Option<User>, AppError> {
        let tables = self.tables()?;
        load_user(&tables.users, &tables.passports, &tables.by_owner, id)
    }

    fn list_users(&self) -> Result<Vec<User>, AppError> {
        let tables = self.tables()?;
        load_users(&tables.users, &tables.passports, &tables.by_owner)
    }
}
