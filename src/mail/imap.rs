use log::{debug, warn};
use native_tls::{TlsConnector, TlsStream};
use std::net::TcpStream;

use crate::config::ImapConfig;
use crate::credentials::Credentials;
use crate::error::StoreError;
use crate::mail::parse::parse_message;
use crate::mail::{MailStore, Message, MessageId};

type Session = imap::Session<TlsStream<TcpStream>>;

fn is_localhost(host: &str) -> bool {
    host == "127.0.0.1" || host == "localhost"
}

fn tls_connector_for(cfg: &ImapConfig) -> Result<TlsConnector, native_tls::Error> {
    let mut b = TlsConnector::builder();

    if is_localhost(&cfg.host) {
        b.danger_accept_invalid_certs(true);
        b.danger_accept_invalid_hostnames(true);
    }

    b.build()
}

/// Comma separated UID set for a FETCH/MOVE command.
fn uid_set(ids: &[MessageId]) -> String {
    ids.iter()
        .map(|id| id.0.to_string())
        .collect::<Vec<_>>()
        .join(",")
}

/// How a message leaves the source folder, by server capability.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum MoveStrategy {
    /// `UID MOVE`.
    Move,
    /// `UID COPY`, flag `\Deleted`, `UID EXPUNGE` of that one UID.
    CopyExpungeUid,
    /// `UID COPY` and flag `\Deleted`. A plain EXPUNGE would also remove
    /// mail the user flagged, so the original is left for the client to purge.
    CopyFlagOnly,
}

fn move_strategy(has_move: bool, has_uidplus: bool) -> MoveStrategy {
    match (has_move, has_uidplus) {
        (true, _) => MoveStrategy::Move,
        (false, true) => MoveStrategy::CopyExpungeUid,
        (false, false) => MoveStrategy::CopyFlagOnly,
    }
}

/// Search criteria for pending mail. Originals left behind by
/// [`MoveStrategy::CopyFlagOnly`] carry `\Deleted` and must not be routed again.
fn pending_search(search: &str, strategy: MoveStrategy) -> String {
    match strategy {
        MoveStrategy::CopyFlagOnly => format!("{search} UNDELETED"),
        _ => search.to_string(),
    }
}

/// [`MailStore`] backed by a live IMAP session.
pub struct ImapStore {
    session: Session,
    search: String,
    strategy: MoveStrategy,
}

impl ImapStore {
    pub fn connect(cfg: &ImapConfig, creds: &Credentials) -> Result<Self, StoreError> {
        let connect_err = |reason: String| StoreError::Connect {
            host: cfg.host.clone(),
            port: cfg.port,
            reason,
        };

        let tls = tls_connector_for(cfg).map_err(|e| connect_err(e.to_string()))?;

        let client = if cfg.starttls {
            imap::connect_starttls((cfg.host.as_str(), cfg.port), &cfg.host, &tls)
        } else {
            imap::connect((cfg.host.as_str(), cfg.port), &cfg.host, &tls)
        }
        .map_err(|e| connect_err(e.to_string()))?;

        let mut session = client
            .login(&creds.login, &creds.password)
            .map_err(|(e, _)| StoreError::Auth {
                login: creds.login.clone(),
                reason: e.to_string(),
            })?;

        let strategy = match session.capabilities() {
            Ok(caps) => move_strategy(caps.has_str("MOVE"), caps.has_str("UIDPLUS")),
            Err(e) => {
                warn!("CAPABILITY failed, moves will copy and flag only: {e}");
                MoveStrategy::CopyFlagOnly
            }
        };
        debug!("IMAP session ready (move strategy: {strategy:?})");
        if strategy == MoveStrategy::CopyFlagOnly {
            warn!("Server has neither MOVE nor UIDPLUS; moved originals stay in the source folder flagged \\Deleted");
        }

        Ok(Self {
            session,
            search: pending_search(&cfg.search, strategy),
            strategy,
        })
    }

    pub fn logout(mut self) {
        let _ = self.session.logout();
    }
}

impl MailStore for ImapStore {
    fn list_pending(&mut self, folder: &str) -> Result<Vec<MessageId>, StoreError> {
        self.session
            .select(folder)
            .map_err(|e| StoreError::Select {
                folder: folder.to_string(),
                reason: e.to_string(),
            })?;

        let mut uids: Vec<u32> = self
            .session
            .uid_search(&self.search)
            .map_err(|e| StoreError::List(e.to_string()))?
            .into_iter()
            .collect();
        uids.sort_unstable();

        Ok(uids.into_iter().map(MessageId).collect())
    }

    fn fetch_batch(&mut self, ids: &[MessageId]) -> Result<Vec<Message>, StoreError> {
        if ids.is_empty() {
            return Ok(vec![]);
        }

        let fetches = self
            .session
            .uid_fetch(uid_set(ids), "(UID BODY.PEEK[])")
            .map_err(|e| StoreError::Fetch(e.to_string()))?;

        let mut out = Vec::with_capacity(fetches.len());
        for f in fetches.iter() {
            // unsolicited FETCH updates for other messages carry no UID
            let Some(uid) = f.uid else { continue };
            let id = MessageId(uid);
            if !ids.contains(&id) {
                continue;
            }
            let raw = f.body().ok_or_else(|| StoreError::Fetch(format!("no body for {id}")))?;
            out.push(parse_message(id, raw)?);
        }

        Ok(out)
    }

    fn move_message(&mut self, id: MessageId, folder: &str) -> Result<(), StoreError> {
        let move_err = |e: imap::error::Error| StoreError::Move {
            id,
            folder: folder.to_string(),
            reason: e.to_string(),
        };
        let set = id.0.to_string();

        if self.strategy == MoveStrategy::Move {
            return self.session.uid_mv(&set, folder).map_err(move_err);
        }

        self.session.uid_copy(&set, folder).map_err(move_err)?;

        // from here on a copy exists in the destination
        let copied_err = |e: imap::error::Error| StoreError::Move {
            id,
            folder: folder.to_string(),
            reason: format!("copied to {folder}, but removing the original failed: {e}"),
        };
        self.session
            .uid_store(&set, "+FLAGS.SILENT (\\Deleted)")
            .map_err(copied_err)?;

        match self.strategy {
            MoveStrategy::CopyExpungeUid => {
                self.session.uid_expunge(&set).map_err(copied_err)?;
            }
            _ => debug!("Message {id} copied to {folder}; original flagged \\Deleted, not expunged"),
        }
        Ok(())
    }

    fn list_folders(&mut self) -> Result<Vec<String>, StoreError> {
        let names = self
            .session
            .list(Some(""), Some("*"))
            .map_err(|e| StoreError::List(e.to_string()))?;

        Ok(names.iter().map(|n| n.name().to_string()).collect())
    }
}
