//! IMAP implementation of [`MailSession`].
//!
//! The wire protocol is handled by `async-imap`; this module adds the
//! transport, timeouts, folder flattening and the parse barrier used by
//! [`MailSession::fetch_full`].

use std::collections::{HashMap, HashSet};
use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use futures::{StreamExt, pin_mut};
use tokio::task::JoinSet;
use tokio_util::compat::{Compat, TokioAsyncReadCompatExt};
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::folders::{ListedFolder, flatten_folders};
use crate::message::{MessageHeaders, ParsedMessage, parse_message};
use crate::session::{
    AttachmentScan, Connector, FolderInfo, MailSession, MailboxInfo, MessageRef, ScanEntry,
    sequence_set,
};
use crate::stream::{self, ImapStream};
use crate::structure::MimeNode;
use crate::{Error, Result};

type Transport = Compat<ImapStream>;

/// Opens [`ImapSession`]s for one account.
#[derive(Debug, Clone)]
pub struct ImapConnector {
    config: Config,
}

impl ImapConnector {
    /// Creates a connector for the given configuration.
    #[must_use]
    pub const fn new(config: Config) -> Self {
        Self { config }
    }

    /// Returns the connection configuration.
    #[must_use]
    pub const fn config(&self) -> &Config {
        &self.config
    }
}

#[async_trait]
impl Connector for ImapConnector {
    type Session = ImapSession;

    async fn connect(&self) -> Result<ImapSession> {
        ImapSession::connect(self.config.clone()).await
    }

    fn describe(&self) -> String {
        format!(
            "{} as {}",
            self.config.address(),
            self.config.credentials.username
        )
    }
}

/// An authenticated IMAP session.
pub struct ImapSession {
    inner: Option<async_imap::Session<Transport>>,
    config: Config,
    selected: Option<String>,
}

impl std::fmt::Debug for ImapSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ImapSession")
            .field("address", &self.config.address())
            .field("connected", &self.inner.is_some())
            .field("selected", &self.selected)
            .finish()
    }
}

impl ImapSession {
    /// Connects and logs in, bounded by the configured login timeout.
    ///
    /// # Errors
    ///
    /// Returns `Error::Timeout` if connect plus login does not finish in
    /// time, `Error::Auth` if the server rejects the credentials, or the
    /// underlying transport error.
    pub async fn connect(config: Config) -> Result<Self> {
        let login = async {
            let transport = stream::connect(&config).await?;
            let client = async_imap::Client::new(transport.compat());
            client
                .login(&config.credentials.username, &config.credentials.password)
                .await
                .map_err(|(e, _)| match e {
                    async_imap::error::Error::No(text) | async_imap::error::Error::Bad(text) => {
                        Error::Auth(text)
                    }
                    other => Error::from(other),
                })
        };

        let inner = with_timeout(config.login_timeout, login).await?;
        info!(
            address = %config.address(),
            user = %config.credentials.username,
            "IMAP session ready"
        );

        Ok(Self {
            inner: Some(inner),
            config,
            selected: None,
        })
    }

    /// Returns the currently selected folder, if any.
    #[must_use]
    pub fn selected(&self) -> Option<&str> {
        self.selected.as_deref()
    }

    fn session_mut(&mut self) -> Result<&mut async_imap::Session<Transport>> {
        self.inner
            .as_mut()
            .ok_or_else(|| Error::InvalidState("session is disconnected".to_string()))
    }

    fn require_selected(&self) -> Result<()> {
        if self.selected.is_none() {
            return Err(Error::InvalidState("no folder selected".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl MailSession for ImapSession {
    async fn list_folders(&mut self) -> Result<Vec<FolderInfo>> {
        let io_timeout = self.config.io_timeout;
        let session = self.session_mut()?;

        let listed = with_timeout(io_timeout, async {
            let names = session.list(Some(""), Some("*")).await?;
            pin_mut!(names);

            let mut listed = Vec::new();
            while let Some(item) = names.next().await {
                match item {
                    Ok(name) => listed.push(ListedFolder::new(name.name(), name.delimiter())),
                    Err(e) => warn!(error = %e, "skipping unreadable LIST entry"),
                }
            }
            Ok::<_, Error>(listed)
        })
        .await?;

        debug!(count = listed.len(), "listed folders");
        Ok(flatten_folders(&listed))
    }

    async fn open_box(&mut self, folder: &str) -> Result<MailboxInfo> {
        let io_timeout = self.config.io_timeout;
        let session = self.session_mut()?;

        let mailbox = with_timeout(io_timeout, async {
            session.select(folder).await.map_err(|e| match e {
                async_imap::error::Error::No(text) => {
                    Error::FolderNotFound(format!("{folder}: {text}"))
                }
                other => Error::from(other),
            })
        })
        .await?;

        self.selected = Some(folder.to_string());
        debug!(folder, exists = mailbox.exists, "folder selected");
        Ok(MailboxInfo {
            exists: mailbox.exists,
        })
    }

    async fn search_all(&mut self) -> Result<Vec<MessageRef>> {
        self.require_selected()?;
        let io_timeout = self.config.io_timeout;
        let session = self.session_mut()?;

        let uids = with_timeout(io_timeout, async {
            Ok::<_, Error>(session.uid_search("ALL").await?)
        })
        .await?;

        let mut ids: Vec<MessageRef> = uids.into_iter().map(MessageRef).collect();
        ids.sort_unstable();
        Ok(ids)
    }

    async fn scan_for_attachments(&mut self, ids: &[MessageRef]) -> Result<AttachmentScan> {
        let mut scan = AttachmentScan::new();
        if ids.is_empty() {
            return Ok(scan);
        }

        self.require_selected()?;
        let io_timeout = self.config.io_timeout;
        let chunk_size = self.config.scan_batch_size.max(1);
        let session = self.session_mut()?;

        for chunk in ids.chunks(chunk_size) {
            for id in chunk {
                scan.insert(*id, false);
            }

            let set = sequence_set(chunk);
            let found = with_timeout(io_timeout, async {
                let fetches = session.uid_fetch(&set, "(UID ENVELOPE BODYSTRUCTURE)").await?;
                pin_mut!(fetches);

                let mut found = AttachmentScan::new();
                while let Some(item) = fetches.next().await {
                    let fetch = match item {
                        Ok(fetch) => fetch,
                        Err(e) => {
                            warn!(error = %e, "skipping unreadable BODYSTRUCTURE response");
                            continue;
                        }
                    };
                    let Some(uid) = fetch.uid else {
                        continue;
                    };
                    let has_attachment = fetch.bodystructure().is_some_and(|body| {
                        MimeNode::from_body_structure(body).has_candidate_attachment()
                    });
                    found.record(
                        MessageRef(uid),
                        ScanEntry {
                            has_attachment,
                            headers: fetch.envelope().map(MessageHeaders::from_envelope),
                        },
                    );
                }
                Ok::<_, Error>(found)
            })
            .await?;

            scan.merge(found);
        }

        Ok(scan)
    }

    async fn fetch_full(&mut self, ids: &[MessageRef]) -> Result<Vec<ParsedMessage>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        self.require_selected()?;
        let io_timeout = self.config.io_timeout;
        let session = self.session_mut()?;

        let wanted: HashSet<MessageRef> = ids.iter().copied().collect();
        let set = sequence_set(ids);
        let mut parsers: JoinSet<(MessageRef, Result<ParsedMessage>)> = JoinSet::new();

        with_timeout(io_timeout, async {
            let fetches = session.uid_fetch(&set, "(UID BODY.PEEK[])").await?;
            pin_mut!(fetches);

            while let Some(item) = fetches.next().await {
                let fetch = match item {
                    Ok(fetch) => fetch,
                    Err(e) => {
                        warn!(error = %e, "skipping unreadable message response");
                        continue;
                    }
                };
                let (Some(uid), Some(body)) = (fetch.uid, fetch.body()) else {
                    debug!("FETCH response without UID or body");
                    continue;
                };

                let id = MessageRef(uid);
                if !wanted.contains(&id) {
                    continue;
                }
                let raw = body.to_vec();
                parsers.spawn_blocking(move || (id, parse_message(id, &raw)));
            }
            Ok::<_, Error>(())
        })
        .await?;

        let mut parsed = Vec::with_capacity(ids.len());
        while let Some(joined) = parsers.join_next().await {
            match joined {
                Ok((_, Ok(message))) => parsed.push(message),
                Ok((id, Err(e))) => warn!(%id, error = %e, "skipping unparseable message"),
                Err(e) => warn!(error = %e, "message parser task failed"),
            }
        }

        let position: HashMap<MessageRef, usize> =
            ids.iter().enumerate().map(|(i, id)| (*id, i)).collect();
        parsed.sort_by_key(|message| position.get(&message.id).copied().unwrap_or(usize::MAX));
        parsed.dedup_by_key(|message| message.id);

        debug!(requested = ids.len(), parsed = parsed.len(), "fetched batch");
        Ok(parsed)
    }

    async fn disconnect(&mut self) {
        self.selected = None;
        let Some(mut session) = self.inner.take() else {
            return;
        };

        match tokio::time::timeout(self.config.io_timeout, session.logout()).await {
            Ok(Ok(())) => debug!(address = %self.config.address(), "logged out"),
            Ok(Err(e)) => debug!(error = %e, "logout failed, dropping connection"),
            Err(_) => debug!("logout timed out, dropping connection"),
        }
    }

    fn is_connected(&self) -> bool {
        self.inner.is_some()
    }
}

async fn with_timeout<T, F>(limit: Duration, fut: F) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    tokio::time::timeout(limit, fut)
        .await
        .map_err(|_| Error::Timeout(limit))?
}
