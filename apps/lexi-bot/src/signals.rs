/// Process shutdown triggers: Ctrl-C everywhere, plus SIGTERM on unix.
///
/// The SIGTERM handler is registered in [`ShutdownSignal::install`], so a
/// terminate delivered before the first poll is not lost.
pub struct ShutdownSignal {
    #[cfg(unix)]
    term: Option<tokio::signal::unix::Signal>,
}

impl ShutdownSignal {
    /// Must be called from inside a tokio runtime.
    pub fn install() -> Self {
        #[cfg(unix)]
        {
            use tokio::signal::unix::{signal, SignalKind};
            let term = match signal(SignalKind::terminate()) {
                Ok(term) => Some(term),
                Err(err) => {
                    tracing::warn!(%err, "SIGTERM handler unavailable; only ctrl-c stops the bot");
                    None
                }
            };
            Self { term }
        }
        #[cfg(not(unix))]
        {
            Self {}
        }
    }

    /// Resolves on the first shutdown signal.
    pub async fn recv(self) {
        #[cfg(unix)]
        {
            if let Some(mut term) = self.term {
                tokio::select! {
                    _ = ctrl_c() => {},
                    _ = term.recv() => {
                        tracing::info!("SIGTERM received");
                    },
                }
            } else {
                ctrl_c().await;
            }
        }
        #[cfg(not(unix))]
        {
            ctrl_c().await;
        }
        tracing::info!("shutdown signal received");
    }
}

async fn ctrl_c() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::warn!(%err, "ctrl-c handler unavailable");
        std::future::pending::<()>().await;
    }
}
