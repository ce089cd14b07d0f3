//! `DocumentStore` implementations: `MongoStore` (production) and
//! `MemoryStore` (in-process test fake).

mod memory;
mod mongo;

pub use memory::MemoryStore;
pub use mongo::MongoStore;

#[cfg(test)]
mod integration {
    //! Exercises `MongoStore` against a real MongoDB instance. Requires
    //! `ENGINE_TEST_MONGO_URI` pointing at a reachable server; skipped by
    //! default since no database is available in a plain unit-test run.
    use super::*;
    use bson::doc;
    use engine_core::store::DocumentStore;

    #[tokio::test]
    #[ignore]
    async fn round_trips_through_a_live_mongo() {
        let uri = std::env::var("ENGINE_TEST_MONGO_URI").expect("ENGINE_TEST_MONGO_URI must be set");
        let store = MongoStore::connect(&uri, "engine_test").await.unwrap();
        let id = store
            .insert_one("steps", doc! { "name": "n0", "run_id": "itest" })
            .await
            .unwrap();
        let found = store
            .find_one("steps", doc! { "_id": id }, None)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(found.get_str("name").unwrap(), "n0");
    }
}
