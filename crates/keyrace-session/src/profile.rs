//! Display identity for players.
//!
//! Keyrace has no accounts. Every `create_lobby`/`join_lobby` carries the
//! name, avatar, and theme the player picked, and a [`ProfileProvider`]
//! turns that claim into the [`Profile`] other players will see. Plug in
//! a provider backed by your own user service to enforce real identities.

use keyrace_protocol::{PlayerId, Profile};

use crate::SessionError;

/// Resolves a claimed display identity into the profile shown in rooms.
///
/// # Example
///
/// ```rust
/// use keyrace_protocol::{PlayerId, Profile};
/// use keyrace_session::{ProfileProvider, SessionError};
///
/// /// Refuses anonymous players.
/// struct NamedOnly;
///
/// impl ProfileProvider for NamedOnly {
///     async fn resolve(
///         &self,
///         _player: PlayerId,
///         claimed: Profile,
///     ) -> Result<Profile, SessionError> {
///         if claimed.username.trim().is_empty() {
///             return Err(SessionError::ProfileRejected("a name is required".into()));
///         }
///         Ok(claimed)
///     }
/// }
/// ```
pub trait ProfileProvider: Send + Sync + 'static {
    /// Returns the profile to display for `player`, or
    /// [`SessionError::ProfileRejected`].
    fn resolve(
        &self,
        player: PlayerId,
        claimed: Profile,
    ) -> impl std::future::Future<Output = Result<Profile, SessionError>> + Send;
}

/// The default provider: accepts everyone, tidying up what they typed.
///
/// Names are trimmed, stripped of control characters, and cut to
/// `max_name_len` characters. A blank name becomes `Guest-<id>`.
#[derive(Debug, Clone)]
pub struct GuestProfiles {
    pub max_name_len: usize,
    pub default_avatar: String,
    pub default_theme: String,
}

impl Default for GuestProfiles {
    fn default() -> Self {
        Self {
            max_name_len: 24,
            default_avatar: "default".into(),
            default_theme: "default".into(),
        }
    }
}

fn clean(raw: &str, max_len: usize) -> String {
    raw.chars()
        .filter(|c| !c.is_control())
        .collect::<String>()
        .trim()
        .chars()
        .take(max_len)
        .collect::<String>()
        .trim_end()
        .to_owned()
}

impl GuestProfiles {
    /// Synchronous core of [`ProfileProvider::resolve`].
    pub fn tidy(&self, player: PlayerId, claimed: &Profile) -> Profile {
        let mut username = clean(&claimed.username, self.max_name_len);
        if username.is_empty() {
            username = format!("Guest-{}", player.0);
        }
        let avatar = match clean(&claimed.avatar, 64) {
            a if a.is_empty() => self.default_avatar.clone(),
            a => a,
        };
        let theme = match clean(&claimed.theme, 64) {
            t if t.is_empty() => self.default_theme.clone(),
            t => t,
        };
        Profile {
            username,
            avatar,
            theme,
        }
    }
}

impl ProfileProvider for GuestProfiles {
    async fn resolve(&self, player: PlayerId, claimed: Profile) -> Result<Profile, SessionError> {
        Ok(self.tidy(player, &claimed))
    }
}
