// Wavebond lifecycle: issue a versioned encrypted credential, redeem a peer's
// credential to establish the mutual friendship edge and its direct chat.
//
// Claims travel as `username=<u>;email=<e>;version=<v>` inside the envelope.
// The layout has no escaping, so field values must never contain `=` or `;`;
// encoding refuses them instead of producing an ambiguous blob.

use std::fmt;
use std::path::Path;

use sqlx::SqlitePool;
use thiserror::Error;

use crate::crypto::Envelope;
use crate::models::{Chat, User};
use crate::{chats, users, AppError, AppResult};

#[derive(Debug, Error, PartialEq)]
pub enum BondError {
    #[error("That wavebond is outdated or doesn't belong to anybody.")]
    Invalid,
    #[error("Sadly, you can't share a wavebond with yourself.")]
    SelfBond,
    #[error("You already share a wavebond with that user.")]
    AlreadyFriends,
}

impl From<BondError> for AppError {
    fn from(err: BondError) -> AppError {
        match err {
            BondError::Invalid => AppError::BadRequest(err.to_string()),
            BondError::SelfBond | BondError::AlreadyFriends => AppError::Conflict(err.to_string()),
        }
    }
}

/// Bond version in integer tenths: first issuance is 1, shown as "0.1".
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct BondVersion(i64);

impl BondVersion {
    pub const fn initial() -> BondVersion {
        BondVersion(1)
    }

    pub const fn from_tenths(tenths: i64) -> BondVersion {
        BondVersion(tenths)
    }

    pub const fn tenths(self) -> i64 {
        self.0
    }

    pub const fn next(self) -> BondVersion {
        BondVersion(self.0 + 1)
    }

    fn parse(raw: &str) -> Result<BondVersion, BondError> {
        let Some((whole, tenth)) = raw.split_once('.') else {
            return Err(BondError::Invalid);
        };
        if whole.is_empty() || tenth.len() != 1 {
            return Err(BondError::Invalid);
        }
        let whole: i64 = whole.parse().map_err(|_| BondError::Invalid)?;
        let tenth: i64 = tenth.parse().map_err(|_| BondError::Invalid)?;
        Ok(BondVersion(whole * 10 + tenth))
    }
}

impl fmt::Display for BondVersion {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}.{}", self.0 / 10, self.0 % 10)
    }
}

#[derive(Debug, PartialEq)]
pub struct BondClaims {
    pub username: String,
    pub email: String,
    pub version: BondVersion,
}

impl BondClaims {
    pub fn encode(&self) -> Result<String, BondError> {
        for value in [&self.username, &self.email] {
            if value.contains(['=', ';']) {
                return Err(BondError::Invalid);
            }
        }
        Ok(format!(
            "username={};email={};version={}",
            self.username, self.email, self.version
        ))
    }

    /// Strict decode: exactly the three known fields, each exactly once,
    /// nothing else. Anything off is the one generic rejection.
    pub fn parse(content: &str) -> Result<BondClaims, BondError> {
        let mut username = None;
        let mut email = None;
        let mut version = None;

        for pair in content.split(';') {
            let Some((key, value)) = pair.split_once('=') else {
                return Err(BondError::Invalid);
            };
            let slot = match key {
                "username" => &mut username,
                "email" => &mut email,
                "version" => &mut version,
                _ => return Err(BondError::Invalid),
            };
            if slot.replace(value).is_some() {
                return Err(BondError::Invalid);
            }
        }

        match (username, email, version) {
            (Some(username), Some(email), Some(version)) => Ok(BondClaims {
                username: username.to_owned(),
                email: email.to_owned(),
                version: BondVersion::parse(version)?,
            }),
            _ => Err(BondError::Invalid),
        }
    }
}

pub async fn current_version(pool: &SqlitePool, uid: &str) -> AppResult<Option<BondVersion>> {
    let row: Option<(i64,)> = sqlx::query_as("SELECT version FROM wavebonds WHERE user_uid=?")
        .bind(uid)
        .fetch_optional(pool)
        .await?;
    Ok(row.map(|(tenths,)| BondVersion::from_tenths(tenths)))
}

/// Issues a fresh bond for the user: version bumped by a tenth (or 0.1 from
/// zero), blob upserted as the single live bond row and mirrored to the
/// per-user artifact file. Old blobs are not revoked; redemption resolves by
/// email, not version.
pub async fn issue(
    pool: &SqlitePool,
    envelope: &Envelope,
    dir: &Path,
    user: &User,
) -> AppResult<Vec<u8>> {
    let version = match current_version(pool, &user.uid).await? {
        Some(version) => version.next(),
        None => BondVersion::initial(),
    };

    let claims = BondClaims {
        username: user.username.clone(),
        email: user.email.clone(),
        version,
    };
    let blob = envelope.seal(&claims.encode().map_err(|_| {
        AppError::BadRequest("Username and email must not contain '=' or ';'.".to_owned())
    })?);

    sqlx::query(
        "INSERT INTO wavebonds (user_uid, wave, version) VALUES (?,?,?)
         ON CONFLICT(user_uid) DO UPDATE SET wave=excluded.wave, version=excluded.version",
    )
    .bind(&user.uid)
    .bind(&blob)
    .bind(version.tenths())
    .execute(pool)
    .await?;

    tokio::fs::create_dir_all(dir).await?;
    tokio::fs::write(dir.join(format!("{}.wavebond", user.username)), &blob).await?;

    tracing::info!(uid = %user.uid, %version, "issued wavebond");
    Ok(blob)
}

/// Redeems a peer's bond blob for `requester`. On success both friend lists
/// gain the other uid and the direct chat exists; returns the updated
/// (owner, requester) pair.
///
/// The two friend-list writes and the chat insert are sequential with no
/// shared transaction. A crash in between leaves a one-sided edge or a
/// missing chat; re-redeeming after repair is the recovery path.
pub async fn redeem(
    pool: &SqlitePool,
    envelope: &Envelope,
    blob: &[u8],
    requester: &User,
) -> AppResult<(User, User)> {
    let content = envelope.open(blob).map_err(|_| BondError::Invalid)?;
    let claims = BondClaims::parse(&content)?;

    let Some(mut owner) = users::get_by_email(pool, &claims.email).await? else {
        return Err(BondError::Invalid.into());
    };

    if owner.uid == requester.uid {
        return Err(BondError::SelfBond.into());
    }
    if owner.friends.contains(&requester.uid) {
        return Err(BondError::AlreadyFriends.into());
    }

    let mut requester = requester.clone();
    requester.friends.push(owner.uid.clone());
    owner.friends.push(requester.uid.clone());

    users::set_friends(pool, &requester.uid, &requester.friends).await?;
    users::set_friends(pool, &owner.uid, &owner.friends).await?;
    chats::insert_chat(pool, &Chat::direct(&requester, &owner)).await?;

    tracing::info!(owner = %owner.uid, requester = %requester.uid, "wavebond redeemed");
    Ok((owner, requester))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn version_starts_at_a_tenth() {
        assert_eq!(BondVersion::initial().to_string(), "0.1");
        assert_eq!(BondVersion::initial().next().to_string(), "0.2");
        assert_eq!(BondVersion::from_tenths(10).to_string(), "1.0");
        assert_eq!(BondVersion::from_tenths(12).to_string(), "1.2");
    }

    #[test]
    fn version_parse_round_trips() {
        for tenths in [1, 2, 9, 10, 11, 130] {
            let version = BondVersion::from_tenths(tenths);
            assert_eq!(BondVersion::parse(&version.to_string()).unwrap(), version);
        }
    }

    #[test]
    fn version_parse_is_strict() {
        for raw in ["", "1", "abc", "1.", ".1", "1.25", "1.x", "-0.1."] {
            assert_eq!(BondVersion::parse(raw), Err(BondError::Invalid), "{raw}");
        }
    }

    #[test]
    fn claims_round_trip() {
        let claims = BondClaims {
            username: "ada".to_owned(),
            email: "ada@wave.net".to_owned(),
            version: BondVersion::initial(),
        };
        let encoded = claims.encode().unwrap();
        assert_eq!(encoded, "username=ada;email=ada@wave.net;version=0.1");
        assert_eq!(BondClaims::parse(&encoded).unwrap(), claims);
    }

    #[test]
    fn claims_parse_fails_closed() {
        let cases = [
            "",
            "username=ada",
            "username=ada;email=a@b",
            "username=ada;email=a@b;version=0.1;extra=x",
            "username=ada;username=eve;version=0.1",
            "username=ada;email=a@b;version=whatever",
            "not a bond at all",
        ];
        for raw in cases {
            assert_eq!(BondClaims::parse(raw), Err(BondError::Invalid), "{raw}");
        }
    }

    #[test]
    fn encode_refuses_separator_bytes() {
        let claims = BondClaims {
            username: "a=b".to_owned(),
            email: "ada@wave.net".to_owned(),
            version: BondVersion::initial(),
        };
        assert_eq!(claims.encode(), Err(BondError::Invalid));

        let claims = BondClaims {
            username: "ada".to_owned(),
            email: "a;b@wave.net".to_owned(),
            version: BondVersion::initial(),
        };
        assert_eq!(claims.encode(), Err(BondError::Invalid));
    }
}
