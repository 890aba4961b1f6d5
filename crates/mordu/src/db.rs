//! MongoDB database connection and configuration

use mongodb::bson::doc;
use mongodb::{options::ClientOptions, options::IndexOptions, Client, Database, IndexModel};

use crate::config::SyncConfig;
use crate::error::MorduResult;

/// MongoDB database wrapper
#[derive(Clone)]
pub struct MongoDb {
    #[allow(dead_code)]
    client: Client,
    db: Database,
}

impl MongoDb {
    /// Connect to MongoDB with the connect, server selection and idle
    /// timeouts from `config`, then make sure indexes exist.
    pub async fn connect(uri: &str, db_name: &str, config: &SyncConfig) -> MorduResult<Self> {
        let mut options = ClientOptions::parse(uri).await?;
        options.app_name = Some("mordu".to_string());
        options.connect_timeout = Some(config.connect_timeout());
        options.server_selection_timeout = Some(config.connect_timeout());
        options.max_idle_time = Some(config.idle_timeout());

        let client = Client::with_options(options)?;
        let db = client.database(db_name);

        // Test connection
        db.run_command(doc! { "ping": 1 }, None).await?;
        tracing::info!("Connected to MongoDB: {}", db_name);

        let instance = Self { client, db };

        // Ensure indexes exist
        instance.ensure_indexes().await?;

        Ok(instance)
    }

    /// Get database reference
    pub fn db(&self) -> &Database {
        &self.db
    }

    /// Get collection
    pub fn collection<T>(&self, name: &str) -> mongodb::Collection<T> {
        self.db.collection(name)
    }

    /// Ping the database to check connection
    pub async fn ping(&self) -> MorduResult<()> {
        self.db.run_command(doc! { "ping": 1 }, None).await?;
        Ok(())
    }

    /// Ensure all required indexes exist
    pub async fn ensure_indexes(&self) -> MorduResult<()> {
        tracing::info!("Ensuring MongoDB indexes...");

        self.create_indexes(
            collections::FORTUNES,
            vec![
                origin_index(),
                IndexModel::builder()
                    .keys(doc! { "created_at": -1 })
                    .build(),
                IndexModel::builder()
                    .keys(doc! { "name": 1, "birthdate": 1, "topic": 1 })
                    .build(),
            ],
        )
        .await?;

        self.create_indexes(
            collections::CHATS,
            vec![
                origin_index(),
                IndexModel::builder()
                    .keys(doc! { "user_id": 1, "updated_at": -1 })
                    .build(),
            ],
        )
        .await?;

        tracing::info!("MongoDB indexes ensured");
        Ok(())
    }

    async fn create_indexes(&self, collection: &str, indexes: Vec<IndexModel>) -> MorduResult<()> {
        let coll = self.db.collection::<mongodb::bson::Document>(collection);
        coll.create_indexes(indexes, None).await?;
        Ok(())
    }
}

/// Unique among documents that carry an origin-reference; documents created
/// directly in MongoDB have none.
fn origin_index() -> IndexModel {
    IndexModel::builder()
        .keys(doc! { "local_id": 1 })
        .options(
            IndexOptions::builder()
                .unique(true)
                .sparse(true)
                .name("local_id_unique".to_string())
                .build(),
        )
        .build()
}

/// Collection names
pub mod collections {
    pub const FORTUNES: &str = "fortunes";
    pub const CHATS: &str = "chats";
}
