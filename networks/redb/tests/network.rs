use bytes::Bytes;
use sdn_core::{
    Keypair, NetworkApi, PutCondition, StructuredRecord, TypeTag, testutil::NetworkTests,
};
use sdn_network_redb::RedbNetwork;

#[tokio::test]
async fn redb_network_passes_contract_tests() {
    let dir = tempfile::tempdir().unwrap();
    let network = RedbNetwork::open(dir.path()).unwrap();
    NetworkTests::new(&network).run_all().await.unwrap();
}

#[tokio::test]
async fn records_survive_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let owner = Keypair::from_seed(&[3; 32]);
    let record = StructuredRecord::new(
        TypeTag::Versioned,
        [4; 32],
        vec![owner.public_key()],
        Bytes::from_static(b"persistent"),
    )
    .unwrap()
    .signed(&owner);
    let address = record.address();

    {
        let network = RedbNetwork::open(dir.path()).unwrap();
        network
            .put(&address, record.serialize(), PutCondition::Absent)
            .await
            .unwrap();
    }

    let network = RedbNetwork::open(dir.path()).unwrap();
    let stored = network.get(&address).await.unwrap().unwrap();
    assert_eq!(stored, record.serialize());
}
