//! Redb order store

use std::cmp::Ordering;
use std::path::Path;
use std::str::FromStr;
use std::sync::Arc;

use async_trait::async_trait;
use daosub_common::database::{self, Directory, DirectoryWriter, OrderDatabase};
use daosub_common::{Community, CommunityId, Identity, OrderId, OrderStatus, SubscriptionOrder};
use redb::{Database, ReadableTable, TableDefinition};

use crate::error::Error;

const ORDERS_TABLE: TableDefinition<[u8; 16], &str> = TableDefinition::new("orders");
// Key is `<subscriber>\x1f<community>`, value is the latest order id for the pair
const PAIR_INDEX_TABLE: TableDefinition<&str, [u8; 16]> = TableDefinition::new("pair_index");
const COMMUNITIES_TABLE: TableDefinition<&str, &str> = TableDefinition::new("communities");
// Keyed by address
const IDENTITIES_TABLE: TableDefinition<&str, &str> = TableDefinition::new("identities");
const CONFIG_TABLE: TableDefinition<&str, &str> = TableDefinition::new("config");

const DATABASE_VERSION: u32 = 1;

fn pair_key(subscriber: &str, community_id: &CommunityId) -> String {
    format!("{}\u{1f}{}", subscriber, community_id)
}

/// Order Redb database
#[derive(Debug, Clone)]
pub struct OrderRedbDatabase {
    db: Arc<Database>,
}

impl OrderRedbDatabase {
    /// Create new [`OrderRedbDatabase`]
    pub fn new(path: &Path) -> Result<Self, Error> {
        let db = Database::create(path)?;

        let db_version = {
            let read_txn = db.begin_read()?;
            match read_txn.open_table(CONFIG_TABLE) {
                Ok(table) => table.get("db_version")?.map(|v| v.value().to_owned()),
                Err(_) => None,
            }
        };

        match db_version {
            Some(db_version) => {
                let current_file_version = u32::from_str(&db_version)?;
                match current_file_version.cmp(&DATABASE_VERSION) {
                    Ordering::Equal => {
                        tracing::info!("Database is at current version {}", DATABASE_VERSION);
                    }
                    Ordering::Less | Ordering::Greater => {
                        tracing::warn!(
                            "Database is at version {} but {} is required",
                            current_file_version,
                            DATABASE_VERSION
                        );
                        return Err(Error::UnknownDatabaseVersion);
                    }
                }
            }
            None => {
                let write_txn = db.begin_write()?;
                {
                    let mut table = write_txn.open_table(CONFIG_TABLE)?;
                    // Open all tables to init a new db
                    let _ = write_txn.open_table(ORDERS_TABLE)?;
                    let _ = write_txn.open_table(PAIR_INDEX_TABLE)?;
                    let _ = write_txn.open_table(COMMUNITIES_TABLE)?;
                    let _ = write_txn.open_table(IDENTITIES_TABLE)?;

                    table.insert("db_version", DATABASE_VERSION.to_string().as_str())?;
                }

                write_txn.commit()?;
            }
        }

        Ok(Self { db: Arc::new(db) })
    }

    /// Load an order, apply `apply` and persist it when it reports a change
    ///
    /// Runs in a single write transaction.
    fn update_order<F, R>(&self, order_id: &OrderId, apply: F) -> Result<R, database::Error>
    where
        F: FnOnce(&mut SubscriptionOrder) -> Result<(bool, R), database::Error>,
    {
        let write_txn = self.db.begin_write().map_err(Error::from)?;

        let result = {
            let mut table = write_txn.open_table(ORDERS_TABLE).map_err(Error::from)?;

            let mut order: SubscriptionOrder =
                match table.get(order_id.to_bytes()).map_err(Error::from)? {
                    Some(raw) => serde_json::from_str(raw.value()).map_err(Error::from)?,
                    None => return Err(database::Error::UnknownOrder(*order_id)),
                };

            let (changed, result) = apply(&mut order)?;

            if changed {
                let json = serde_json::to_string(&order).map_err(Error::from)?;
                table
                    .insert(order_id.to_bytes(), json.as_str())
                    .map_err(Error::from)?;
            }

            result
        };

        write_txn.commit().map_err(Error::from)?;

        Ok(result)
    }
}

#[async_trait]
impl OrderDatabase for OrderRedbDatabase {
    type Err = database::Error;

    async fn add_order(&self, order: SubscriptionOrder) -> Result<(), Self::Err> {
        let write_txn = self.db.begin_write().map_err(Error::from)?;

        {
            let mut index = write_txn
                .open_table(PAIR_INDEX_TABLE)
                .map_err(Error::from)?;
            let mut orders = write_txn.open_table(ORDERS_TABLE).map_err(Error::from)?;

            let key = pair_key(&order.subscriber, &order.community_id);
            let latest = index
                .get(key.as_str())
                .map_err(Error::from)?
                .map(|v| v.value());

            if let Some(latest) = latest {
                if let Some(raw) = orders.get(latest).map_err(Error::from)? {
                    let existing: SubscriptionOrder =
                        serde_json::from_str(raw.value()).map_err(Error::from)?;
                    if !existing.is_terminal() {
                        return Err(database::Error::DuplicateOrder);
                    }
                }
            }

            let json = serde_json::to_string(&order).map_err(Error::from)?;
            orders
                .insert(order.id.to_bytes(), json.as_str())
                .map_err(Error::from)?;
            index
                .insert(key.as_str(), order.id.to_bytes())
                .map_err(Error::from)?;
        }

        write_txn.commit().map_err(Error::from)?;

        Ok(())
    }

    async fn get_order(&self, order_id: &OrderId) -> Result<Option<SubscriptionOrder>, Self::Err> {
        let read_txn = self.db.begin_read().map_err(Error::from)?;
        let table = read_txn.open_table(ORDERS_TABLE).map_err(Error::from)?;

        let order = table
            .get(order_id.to_bytes())
            .map_err(Error::from)?
            .map(|raw| serde_json::from_str(raw.value()))
            .transpose()
            .map_err(Error::from)?;

        Ok(order)
    }

    async fn find_order(
        &self,
        subscriber: &str,
        community_id: &CommunityId,
    ) -> Result<Option<SubscriptionOrder>, Self::Err> {
        let read_txn = self.db.begin_read().map_err(Error::from)?;
        let index = read_txn
            .open_table(PAIR_INDEX_TABLE)
            .map_err(Error::from)?;

        let key = pair_key(subscriber, community_id);
        let latest = index
            .get(key.as_str())
            .map_err(Error::from)?
            .map(|v| v.value());

        let Some(latest) = latest else {
            return Ok(None);
        };

        let orders = read_txn.open_table(ORDERS_TABLE).map_err(Error::from)?;
        let order = orders
            .get(latest)
            .map_err(Error::from)?
            .map(|raw| serde_json::from_str(raw.value()))
            .transpose()
            .map_err(Error::from)?;

        Ok(order)
    }

    async fn get_orders_by_status(
        &self,
        status: OrderStatus,
    ) -> Result<Vec<SubscriptionOrder>, Self::Err> {
        let read_txn = self.db.begin_read().map_err(Error::from)?;
        let table = read_txn.open_table(ORDERS_TABLE).map_err(Error::from)?;

        let mut orders = Vec::new();
        for entry in table.iter().map_err(Error::from)? {
            let (_, raw) = entry.map_err(Error::from)?;
            let order: SubscriptionOrder =
                serde_json::from_str(raw.value()).map_err(Error::from)?;

            if order.status == status {
                orders.push(order);
            }
        }

        Ok(orders)
    }

    async fn release_initiation(&self, order_id: &OrderId) -> Result<bool, Self::Err> {
        self.update_order(order_id, |order| {
            let released = order.release_initiation();
            Ok((released, released))
        })
    }

    async fn claim_initiation(&self, order_id: &OrderId, now: u64) -> Result<bool, Self::Err> {
        self.update_order(order_id, |order| {
            let claimed = order.claim_initiation(now);
            Ok((claimed, claimed))
        })
    }

    async fn attach_tx_id(
        &self,
        order_id: &OrderId,
        tx_id: &str,
    ) -> Result<SubscriptionOrder, Self::Err> {
        self.update_order(order_id, |order| {
            order.mark_submitted(tx_id)?;
            Ok((true, order.clone()))
        })
    }

    async fn finalize_order(
        &self,
        order_id: &OrderId,
        tx_id: &str,
        status: OrderStatus,
    ) -> Result<(SubscriptionOrder, bool), Self::Err> {
        self.update_order(order_id, |order| {
            let changed = order.finalize(tx_id, status)?;
            Ok((changed, (order.clone(), changed)))
        })
    }
}

#[async_trait]
impl Directory for OrderRedbDatabase {
    type Err = database::Error;

    async fn get_community(&self, id: &CommunityId) -> Result<Option<Community>, Self::Err> {
        let read_txn = self.db.begin_read().map_err(Error::from)?;
        let table = read_txn
            .open_table(COMMUNITIES_TABLE)
            .map_err(Error::from)?;

        let community = table
            .get(id.as_str())
            .map_err(Error::from)?
            .map(|raw| serde_json::from_str(raw.value()))
            .transpose()
            .map_err(Error::from)?;

        Ok(community)
    }

    async fn get_identity(&self, address: &str) -> Result<Option<Identity>, Self::Err> {
        let read_txn = self.db.begin_read().map_err(Error::from)?;
        let table = read_txn
            .open_table(IDENTITIES_TABLE)
            .map_err(Error::from)?;

        let identity = table
            .get(address)
            .map_err(Error::from)?
            .map(|raw| serde_json::from_str(raw.value()))
            .transpose()
            .map_err(Error::from)?;

        Ok(identity)
    }
}

#[async_trait]
impl DirectoryWriter for OrderRedbDatabase {
    type Err = database::Error;

    async fn put_community(&self, community: Community) -> Result<(), Self::Err> {
        let write_txn = self.db.begin_write().map_err(Error::from)?;

        {
            let mut table = write_txn
                .open_table(COMMUNITIES_TABLE)
                .map_err(Error::from)?;
            table
                .insert(
                    community.id.as_str(),
                    serde_json::to_string(&community)
                        .map_err(Error::from)?
                        .as_str(),
                )
                .map_err(Error::from)?;
        }
        write_txn.commit().map_err(Error::from)?;

        Ok(())
    }

    async fn put_identity(&self, identity: Identity) -> Result<(), Self::Err> {
        let write_txn = self.db.begin_write().map_err(Error::from)?;

        {
            let mut table = write_txn
                .open_table(IDENTITIES_TABLE)
                .map_err(Error::from)?;
            table
                .insert(
                    identity.address.as_str(),
                    serde_json::to_string(&identity)
                        .map_err(Error::from)?
                        .as_str(),
                )
                .map_err(Error::from)?;
        }
        write_txn.commit().map_err(Error::from)?;

        Ok(())
    }
}
