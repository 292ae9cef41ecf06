//! Patron identity: nickname plus an animal avatar, persisted per device.
//!
//! There is no authentication. Staff pick the reserved admin nickname or tick
//! the admin flag when setting up the device.

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::CafeError;
use crate::storage::KeyValueStore;

pub const ADMIN_NICKNAME: &str = "管理者";
pub const MAX_NICKNAME_CHARS: usize = 20;

/// Selectable avatars, `"<emoji> <label>"`.
pub const ANIMALS: &[&str] = &[
    "🐶 いぬ",
    "🐱 ねこ",
    "🐰 うさぎ",
    "🐻 くま",
    "🐼 パンダ",
    "🐯 とら",
    "🦁 ライオン",
    "🐸 かえる",
    "🐧 ペンギン",
    "🐺 おおかみ",
    "🦊 きつね",
    "🐹 ハムスター",
    "🐨 コアラ",
    "🐒 さる",
    "🐘 ぞう",
    "🦒 きりん",
];

const KEY_USER_ID: &str = "cafe-user-id";
const KEY_NICKNAME: &str = "cafe-nickname";
const KEY_ANIMAL: &str = "cafe-animal";
const KEY_IS_ADMIN: &str = "cafe-is-admin";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserIdentity {
    pub user_id: String,
    pub nickname: String,
    pub animal: String,
    #[serde(default)]
    pub is_admin: bool,
}

/// Emoji half of an avatar tag.
pub fn animal_emoji(animal: &str) -> &str {
    animal.split(' ').next().unwrap_or_default()
}

/// Label half of an avatar tag.
pub fn animal_label(animal: &str) -> &str {
    animal.split(' ').nth(1).unwrap_or_default()
}

impl UserIdentity {
    /// Validate the nickname and avatar and derive the user id
    /// `<nickname>_<animal label>`.
    pub fn new(nickname: &str, animal: &str, is_admin: bool) -> Result<Self, CafeError> {
        let nickname = nickname.trim();
        if nickname.is_empty() {
            return Err(CafeError::Validation("Enter a nickname".into()));
        }
        if nickname.chars().count() > MAX_NICKNAME_CHARS {
            return Err(CafeError::Validation(format!(
                "Nickname must be at most {MAX_NICKNAME_CHARS} characters"
            )));
        }
        if !ANIMALS.contains(&animal) {
            return Err(CafeError::Validation("Pick an animal".into()));
        }

        Ok(Self {
            user_id: format!("{nickname}_{}", animal_label(animal)),
            nickname: nickname.to_string(),
            animal: animal.to_string(),
            is_admin,
        })
    }

    /// Admin if flagged at setup or using the reserved nickname.
    pub fn is_admin(&self) -> bool {
        self.is_admin || self.nickname == ADMIN_NICKNAME
    }
}

/// Loads and saves the identity through an injected store.
pub struct IdentityStore<S> {
    store: S,
}

impl<S: KeyValueStore> IdentityStore<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    /// The saved identity, if all of id, nickname and animal are present.
    pub fn load(&self) -> Result<Option<UserIdentity>, CafeError> {
        let user_id = self.store.get(KEY_USER_ID)?;
        let nickname = self.store.get(KEY_NICKNAME)?;
        let animal = self.store.get(KEY_ANIMAL)?;
        match (user_id, nickname, animal) {
            (Some(user_id), Some(nickname), Some(animal)) => Ok(Some(UserIdentity {
                user_id,
                nickname,
                animal,
                is_admin: self.store.get_bool(KEY_IS_ADMIN)?,
            })),
            _ => Ok(None),
        }
    }

    pub fn save(&self, identity: &UserIdentity) -> Result<(), CafeError> {
        self.store.set(KEY_USER_ID, &identity.user_id)?;
        self.store.set(KEY_NICKNAME, &identity.nickname)?;
        self.store.set(KEY_ANIMAL, &identity.animal)?;
        self.store
            .set(KEY_IS_ADMIN, if identity.is_admin { "true" } else { "false" })?;
        info!(user_id = %identity.user_id, admin = identity.is_admin(), "identity saved");
        Ok(())
    }

    pub fn clear(&self) -> Result<(), CafeError> {
        for key in [KEY_USER_ID, KEY_NICKNAME, KEY_ANIMAL, KEY_IS_ADMIN] {
            self.store.remove(key)?;
        }
        Ok(())
    }
}
