use sqlx::SqlitePool;

use wavenet::crypto::Envelope;
use wavenet::models::{User, DEFAULT_AVATAR};
use wavenet::wavebond::bond::{self, BondClaims, BondVersion};
use wavenet::{chats, db, users, AppError};

async fn pool() -> SqlitePool {
    // one connection so every query sees the same in-memory database
    let pool = db::connect("sqlite::memory:", 1).await.unwrap();
    db::init_schema(&pool).await.unwrap();
    pool
}

fn user(name: &str) -> User {
    User {
        uid: format!("uid-{name}"),
        username: name.to_owned(),
        email: format!("{name}@wave.net"),
        friends: Vec::new(),
        public_profile: false,
        profile_picture: DEFAULT_AVATAR.to_owned(),
    }
}

async fn seed(pool: &SqlitePool, names: &[&str]) -> Vec<User> {
    let mut seeded = Vec::new();
    for name in names {
        let user = user(name);
        users::create(pool, &user).await.unwrap();
        seeded.push(user);
    }
    seeded
}

#[tokio::test]
async fn issuing_bumps_version_by_a_tenth() {
    let pool = pool().await;
    let envelope = Envelope::new("secret");
    let dir = tempfile::tempdir().unwrap();
    let [ada] = seed(&pool, &["ada"]).await.try_into().unwrap();

    assert_eq!(bond::current_version(&pool, &ada.uid).await.unwrap(), None);

    for expected in 1..=3i64 {
        bond::issue(&pool, &envelope, dir.path(), &ada).await.unwrap();
        assert_eq!(
            bond::current_version(&pool, &ada.uid).await.unwrap(),
            Some(BondVersion::from_tenths(expected))
        );
    }

    assert!(dir.path().join("ada.wavebond").exists());
}

#[tokio::test]
async fn issued_blob_carries_the_claims() {
    let pool = pool().await;
    let envelope = Envelope::new("secret");
    let dir = tempfile::tempdir().unwrap();
    let [ada] = seed(&pool, &["ada"]).await.try_into().unwrap();

    let blob = bond::issue(&pool, &envelope, dir.path(), &ada).await.unwrap();
    let claims = BondClaims::parse(&envelope.open(&blob).unwrap()).unwrap();

    assert_eq!(claims.username, "ada");
    assert_eq!(claims.email, "ada@wave.net");
    assert_eq!(claims.version, BondVersion::initial());
}

#[tokio::test]
async fn redemption_is_symmetric_and_creates_one_chat() {
    let pool = pool().await;
    let envelope = Envelope::new("secret");
    let dir = tempfile::tempdir().unwrap();
    let [ada, grace] = seed(&pool, &["ada", "grace"]).await.try_into().unwrap();

    let blob = bond::issue(&pool, &envelope, dir.path(), &ada).await.unwrap();
    let (owner, requester) = bond::redeem(&pool, &envelope, &blob, &grace).await.unwrap();

    assert_eq!(owner.uid, ada.uid);
    assert!(owner.friends.contains(&grace.uid));
    assert!(requester.friends.contains(&ada.uid));

    // both sides persisted, not just the returned copies
    let ada = users::get_by_uid(&pool, &ada.uid).await.unwrap().unwrap();
    let grace = users::get_by_uid(&pool, &grace.uid).await.unwrap().unwrap();
    assert_eq!(ada.friends, vec![grace.uid.clone()]);
    assert_eq!(grace.friends, vec![ada.uid.clone()]);

    let chat = chats::find_direct(&pool, &ada.uid, &grace.uid).await.unwrap().unwrap();
    let mut participants: Vec<_> = chat.users.iter().map(|u| u.uid.clone()).collect();
    participants.sort();
    let mut expected = vec![ada.uid.clone(), grace.uid.clone()];
    expected.sort();
    assert_eq!(participants, expected);

    let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM chats")
        .fetch_one(&pool)
        .await
        .unwrap();
    assert_eq!(count, 1);
}

#[tokio::test]
async fn redeeming_the_same_bond_twice_conflicts() {
    let pool = pool().await;
    let envelope = Envelope::new("secret");
    let dir = tempfile::tempdir().unwrap();
    let [ada, grace] = seed(&pool, &["ada", "grace"]).await.try_into().unwrap();

    let blob = bond::issue(&pool, &envelope, dir.path(), &ada).await.unwrap();
    bond::redeem(&pool, &envelope, &blob, &grace).await.unwrap();

    let err = bond::redeem(&pool, &envelope, &blob, &grace).await.unwrap_err();
    assert!(matches!(&err, AppError::Conflict(msg) if msg.contains("already share")));
}

#[tokio::test]
async fn own_bond_is_rejected() {
    let pool = pool().await;
    let envelope = Envelope::new("secret");
    let dir = tempfile::tempdir().unwrap();
    let [ada] = seed(&pool, &["ada"]).await.try_into().unwrap();

    let blob = bond::issue(&pool, &envelope, dir.path(), &ada).await.unwrap();
    let err = bond::redeem(&pool, &envelope, &blob, &ada).await.unwrap_err();
    assert!(matches!(&err, AppError::Conflict(msg) if msg.contains("yourself")));
}

#[tokio::test]
async fn foreign_key_blob_is_rejected() {
    let pool = pool().await;
    let dir = tempfile::tempdir().unwrap();
    let [ada, grace] = seed(&pool, &["ada", "grace"]).await.try_into().unwrap();

    let blob = bond::issue(&pool, &Envelope::new("key A"), dir.path(), &ada).await.unwrap();
    let err = bond::redeem(&pool, &Envelope::new("key B"), &blob, &grace).await.unwrap_err();
    assert!(matches!(err, AppError::BadRequest(_)));
}

#[tokio::test]
async fn unknown_email_is_rejected() {
    let pool = pool().await;
    let envelope = Envelope::new("secret");
    let [grace] = seed(&pool, &["grace"]).await.try_into().unwrap();

    // well-formed claims, but nobody owns that email
    let blob = envelope.seal("username=ghost;email=ghost@wave.net;version=0.1");
    let err = bond::redeem(&pool, &envelope, &blob, &grace).await.unwrap_err();
    assert!(matches!(err, AppError::BadRequest(_)));
}

#[tokio::test]
async fn stale_blob_survives_a_reissue() {
    let pool = pool().await;
    let envelope = Envelope::new("secret");
    let dir = tempfile::tempdir().unwrap();
    let [ada, grace] = seed(&pool, &["ada", "grace"]).await.try_into().unwrap();

    let old_blob = bond::issue(&pool, &envelope, dir.path(), &ada).await.unwrap();
    bond::issue(&pool, &envelope, dir.path(), &ada).await.unwrap();
    assert_eq!(
        bond::current_version(&pool, &ada.uid).await.unwrap(),
        Some(BondVersion::from_tenths(2))
    );

    // resolution goes by email, so the version bump does not revoke old blobs
    let (owner, _) = bond::redeem(&pool, &envelope, &old_blob, &grace).await.unwrap();
    assert_eq!(owner.uid, ada.uid);
}
