//! Durable holder of the credential pair.
//!
//! The pair is written with a single [`KeyValueStore::set`] batch and read back as a unit.
//! Any partial state found on disk is treated as corruption: the store is wiped and callers
//! see no credentials at all.

// self
use crate::{
	_prelude::*,
	auth::{CredentialPair, TokenCodec, TokenGrant, TokenSecret},
	clock::{self, Clock},
	obs,
	store::KeyValueStore,
};

/// Storage keys for the three persisted fields.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CredentialKeys {
	/// Key holding the access token.
	pub access_token: String,
	/// Key holding the refresh token.
	pub refresh_token: String,
	/// Key holding the access expiry in epoch milliseconds.
	pub expiry: String,
}
impl CredentialKeys {
	fn all(&self) -> [&str; 3] {
		[&self.access_token, &self.refresh_token, &self.expiry]
	}
}
impl Default for CredentialKeys {
	fn default() -> Self {
		Self {
			access_token: "access_token".into(),
			refresh_token: "refresh_token".into(),
			expiry: "token_expiry".into(),
		}
	}
}

/// Credential pair persistence over a [`KeyValueStore`].
#[derive(Clone)]
pub struct CredentialStore {
	backend: Arc<dyn KeyValueStore>,
	clock: Arc<dyn Clock>,
	codec: TokenCodec,
	keys: CredentialKeys,
}
impl CredentialStore {
	/// Creates a store using the default keys.
	pub fn new(backend: Arc<dyn KeyValueStore>, clock: Arc<dyn Clock>) -> Self {
		Self { backend, clock, codec: TokenCodec, keys: CredentialKeys::default() }
	}

	/// Overrides the storage keys.
	pub fn with_keys(mut self, keys: CredentialKeys) -> Self {
		self.keys = keys;

		self
	}

	/// Storage keys in use.
	pub fn keys(&self) -> &CredentialKeys {
		&self.keys
	}

	/// Clock used for expiry arithmetic.
	pub fn clock(&self) -> &Arc<dyn Clock> {
		&self.clock
	}

	/// Stores a new pair whose access token expires `expires_in_secs` from now.
	pub fn set(
		&self,
		access_token: impl Into<String>,
		refresh_token: impl Into<String>,
		expires_in_secs: i64,
	) -> Result<CredentialPair> {
		let grant = TokenGrant::new(access_token, refresh_token, expires_in_secs);
		let pair = CredentialPair::from_grant(&grant, self.clock.now())?;

		self.store_pair(&pair)?;

		Ok(pair)
	}

	/// Persists all three fields of `pair` as one batch.
	pub fn store_pair(&self, pair: &CredentialPair) -> Result<()> {
		self.backend.set(vec![
			(self.keys.access_token.clone(), pair.access_token.expose().to_owned()),
			(self.keys.refresh_token.clone(), pair.refresh_token.expose().to_owned()),
			(self.keys.expiry.clone(), clock::unix_millis(pair.access_expires_at).to_string()),
		])?;

		Ok(())
	}

	/// Reads the full pair. Partial or unparseable state clears the store and yields `None`.
	pub fn load(&self) -> Result<Option<CredentialPair>> {
		let access = self.backend.get(&self.keys.access_token)?;
		let refresh = self.backend.get(&self.keys.refresh_token)?;
		let expiry = self.backend.get(&self.keys.expiry)?;
		let reason = match (access, refresh, expiry) {
			(None, None, None) => return Ok(None),
			(Some(access), Some(refresh), Some(expiry)) => {
				let parsed = expiry.trim().parse::<i64>().ok().and_then(clock::from_unix_millis);

				match parsed {
					Some(_) if access.trim().is_empty() || refresh.trim().is_empty() =>
						"empty token",
					Some(access_expires_at) =>
						return Ok(Some(CredentialPair {
							access_token: TokenSecret::new(access),
							refresh_token: TokenSecret::new(refresh),
							access_expires_at,
						})),
					None => "unparseable expiry",
				}
			},
			_ => "partial credential pair",
		};

		obs::record_warning(obs::FlowKind::AcquireToken, "credential_store_corrupted", reason);
		self.clear()?;

		Ok(None)
	}

	/// Stored access token, if any.
	pub fn get_access(&self) -> Result<Option<TokenSecret>> {
		Ok(self.load()?.map(|pair| pair.access_token))
	}

	/// Stored refresh token, if any.
	pub fn get_refresh(&self) -> Result<Option<TokenSecret>> {
		Ok(self.load()?.map(|pair| pair.refresh_token))
	}

	/// Stored absolute access expiry, if any.
	pub fn get_expiry(&self) -> Result<Option<OffsetDateTime>> {
		Ok(self.load()?.map(|pair| pair.access_expires_at))
	}

	/// Removes every field. Clearing an empty store is a no-op.
	pub fn clear(&self) -> Result<()> {
		self.backend.remove(&self.keys.all())?;

		Ok(())
	}

	/// `true` when no access token is stored or its stored expiry has passed.
	pub fn is_access_expired(&self) -> Result<bool> {
		let now = self.clock.now();

		Ok(self.load()?.is_none_or(|pair| pair.is_access_expired_at(now)))
	}

	/// `true` when no access token is stored or it expires within `minutes`.
	pub fn is_access_expiring_soon(&self, minutes: i64) -> Result<bool> {
		let now = self.clock.now();

		Ok(self
			.load()?
			.is_none_or(|pair| pair.access_expires_within(Duration::minutes(minutes), now)))
	}

	/// `true` when no refresh token is stored or its `exp` claim has passed.
	pub fn is_refresh_expired(&self) -> Result<bool> {
		let now = self.clock.now();

		Ok(self
			.load()?
			.is_none_or(|pair| self.codec.is_expired(pair.refresh_token.expose(), now)))
	}
}
impl Debug for CredentialStore {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("CredentialStore").field("keys", &self.keys).finish_non_exhaustive()
	}
}
