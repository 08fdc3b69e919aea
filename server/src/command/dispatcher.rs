//! Command dispatcher - applies session rules and runs hardware commands

use super::error::CommandError;
use super::executor::{HardwareCommand, HardwareExecutor};
use crate::session::SessionStore;
use pulsegate_shared::{Action, CommandMessage, Response, UnknownVerb, Verb};
use std::net::IpAddr;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

/// Decides what each request may do and produces exactly one response for it
pub struct CommandDispatcher {
    store: Arc<SessionStore>,
    executor: Arc<dyn HardwareExecutor>,
    /// Held for the whole evaluate-then-apply step; one hardware command at a time
    in_flight: Mutex<()>,
}

impl CommandDispatcher {
    /// Create a new command dispatcher
    pub fn new(store: Arc<SessionStore>, executor: Arc<dyn HardwareExecutor>) -> Self {
        Self {
            store,
            executor,
            in_flight: Mutex::new(()),
        }
    }

    pub fn store(&self) -> &Arc<SessionStore> {
        &self.store
    }

    /// Handle a request and map the outcome to a response
    pub async fn dispatch(&self, message: &CommandMessage, requester: IpAddr) -> Response {
        match self.handle(message, requester).await {
            Ok(output) => {
                debug!("{} from {} -> {:?}", message.cmd, requester, output);
                Response::Success(output)
            }
            Err(e) => {
                warn!("{} from {} failed: {}", message.cmd, requester, e);
                Response::Error(e.to_string())
            }
        }
    }

    /// Handle a request, returning the success text or the reason it failed
    pub async fn handle(
        &self,
        message: &CommandMessage,
        requester: IpAddr,
    ) -> Result<String, CommandError> {
        let verb = message
            .verb()
            .map_err(|UnknownVerb(cmd)| CommandError::Usage(cmd))?;

        let _guard = self.in_flight.lock().await;
        let state = self.store.state().await;
        let action = state.evaluate(verb, requester)?;

        match action {
            Action::Reset { previous } => {
                match previous {
                    Some(owner) if owner != requester => warn!(
                        "Session of {} reset by another client {}",
                        owner, requester
                    ),
                    _ => {}
                }
                self.store.clear().await?;
                info!("Session reset by {}", requester);
                Ok("Session reset, try opening a session again.".into())
            }
            Action::Claim(addr) => {
                self.store.set(addr).await?;
                info!("Session opened to {}", addr);
                Ok(format!("Session opened to ip {addr}"))
            }
            // Client being redundant, not an error
            Action::Confirm(addr) => Ok(format!("Session opened to ip {addr}")),
            Action::Execute(verb) => {
                let command = hardware_command(verb, message)?;
                info!("Executing {} for {}", command, requester);
                Ok(self.executor.run(command).await?)
            }
            Action::Release => {
                self.store.clear().await?;
                info!("Session closed by {}", requester);
                Ok("Session closed.".into())
            }
        }
    }
}

/// Build the hardware command for an allowed verb, validating `load` fields
fn hardware_command(verb: Verb, message: &CommandMessage) -> Result<HardwareCommand, CommandError> {
    match verb {
        Verb::Start => Ok(HardwareCommand::Start),
        Verb::Stop => Ok(HardwareCommand::Stop),
        Verb::Load => {
            let code = message
                .code
                .as_ref()
                .ok_or_else(|| CommandError::Validation("code not found in json object".into()))?;
            let clk = message
                .clk
                .as_ref()
                .ok_or_else(|| CommandError::Validation("clk not found in json object".into()))?;

            debug!("Received {} characters of code, clk {:?}", code.len(), clk);

            if clk.value().is_none() {
                return Err(CommandError::Validation("clk must be numeric.".into()));
            }

            Ok(HardwareCommand::Load {
                code: code.clone(),
                clock: clk.as_argument(),
            })
        }
        other => Err(CommandError::Usage(other.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::ProcessError;
    use async_trait::async_trait;
    use pulsegate_shared::{codec, Clock};
    use std::sync::Mutex as StdMutex;

    /// Records every command and answers with a canned result
    #[derive(Default)]
    struct FakeExecutor {
        calls: StdMutex<Vec<HardwareCommand>>,
        fail_with: Option<String>,
    }

    impl FakeExecutor {
        fn failing(output: &str) -> Self {
            Self {
                fail_with: Some(output.into()),
                ..Default::default()
            }
        }

        fn calls(&self) -> Vec<HardwareCommand> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl HardwareExecutor for FakeExecutor {
        async fn run(&self, command: HardwareCommand) -> Result<String, ProcessError> {
            let verb = command.verb();
            self.calls.lock().unwrap().push(command);
            match &self.fail_with {
                Some(output) => Err(ProcessError::Failed {
                    code: Some(1),
                    output: output.clone(),
                }),
                None => Ok(format!("{verb} ok")),
            }
        }
    }

    fn a() -> IpAddr {
        "1.2.3.4".parse().unwrap()
    }

    fn b() -> IpAddr {
        "5.6.7.8".parse().unwrap()
    }

    fn setup() -> (CommandDispatcher, Arc<FakeExecutor>) {
        let executor = Arc::new(FakeExecutor::default());
        let dispatcher =
            CommandDispatcher::new(Arc::new(SessionStore::in_memory()), executor.clone());
        (dispatcher, executor)
    }

    fn cmd(verb: Verb) -> CommandMessage {
        CommandMessage::new(verb)
    }

    #[tokio::test]
    async fn test_open_then_start() {
        let (dispatcher, executor) = setup();

        let opened = dispatcher.dispatch(&cmd(Verb::Open), a()).await;
        assert_eq!(opened, Response::Success("Session opened to ip 1.2.3.4".into()));
        assert_eq!(dispatcher.store().get().await, Some(a()));

        let started = dispatcher.dispatch(&cmd(Verb::Start), a()).await;
        assert_eq!(started, Response::Success("start ok".into()));
        assert_eq!(executor.calls(), vec![HardwareCommand::Start]);
    }

    #[tokio::test]
    async fn test_command_without_session() {
        let (dispatcher, executor) = setup();

        let err = dispatcher.handle(&cmd(Verb::Start), a()).await.unwrap_err();
        assert!(matches!(err, CommandError::Ownership(_)));
        assert!(executor.calls().is_empty());
    }

    #[tokio::test]
    async fn test_other_client_is_rejected() {
        let (dispatcher, executor) = setup();
        dispatcher.dispatch(&cmd(Verb::Open), a()).await;

        for verb in [Verb::Open, Verb::Start, Verb::Stop, Verb::Close] {
            let response = dispatcher.dispatch(&cmd(verb), b()).await;
            assert_eq!(
                response,
                Response::Error("Another client is in session, try later or force reset.".into())
            );
        }
        assert_eq!(dispatcher.store().get().await, Some(a()));
        assert!(executor.calls().is_empty());
    }

    #[tokio::test]
    async fn test_open_is_idempotent_for_owner() {
        let (dispatcher, _) = setup();
        dispatcher.dispatch(&cmd(Verb::Open), a()).await;

        let again = dispatcher.dispatch(&cmd(Verb::Open), a()).await;
        assert_eq!(again, Response::Success("Session opened to ip 1.2.3.4".into()));
        assert_eq!(dispatcher.store().get().await, Some(a()));
    }

    #[tokio::test]
    async fn test_reset_unblocks_other_client() {
        let (dispatcher, _) = setup();
        dispatcher.dispatch(&cmd(Verb::Open), a()).await;

        for _ in 0..2 {
            let reset = dispatcher.dispatch(&cmd(Verb::Reset), b()).await;
            assert_eq!(
                reset,
                Response::Success("Session reset, try opening a session again.".into())
            );
            assert_eq!(dispatcher.store().get().await, None);
        }

        let opened = dispatcher.dispatch(&cmd(Verb::Open), b()).await;
        assert!(!opened.is_error());
        assert_eq!(dispatcher.store().get().await, Some(b()));
    }

    #[tokio::test]
    async fn test_close_releases_session() {
        let (dispatcher, _) = setup();
        dispatcher.dispatch(&cmd(Verb::Open), a()).await;

        let closed = dispatcher.dispatch(&cmd(Verb::Close), a()).await;
        assert_eq!(closed, Response::Success("Session closed.".into()));
        assert_eq!(dispatcher.store().get().await, None);
    }

    #[tokio::test]
    async fn test_load_forwards_code_and_clock() {
        let (dispatcher, executor) = setup();
        dispatcher.dispatch(&cmd(Verb::Open), a()).await;

        let response = dispatcher
            .dispatch(&CommandMessage::load("...", "1e6"), a())
            .await;
        assert_eq!(response, Response::Success("load ok".into()));
        assert_eq!(
            executor.calls(),
            vec![HardwareCommand::Load {
                code: "...".into(),
                clock: "1e6".into(),
            }]
        );
    }

    #[tokio::test]
    async fn test_load_rejects_non_numeric_clock() {
        let (dispatcher, executor) = setup();
        dispatcher.dispatch(&cmd(Verb::Open), a()).await;

        let response = dispatcher
            .dispatch(&CommandMessage::load("...", "abc"), a())
            .await;
        assert_eq!(response, Response::Error("clk must be numeric.".into()));
        assert!(executor.calls().is_empty());
    }

    #[tokio::test]
    async fn test_load_requires_fields() {
        let (dispatcher, executor) = setup();
        dispatcher.dispatch(&cmd(Verb::Open), a()).await;

        let no_code = CommandMessage {
            code: None,
            ..CommandMessage::load("", Clock::from(100.0))
        };
        let err = dispatcher.handle(&no_code, a()).await.unwrap_err();
        assert_eq!(err.to_string(), "code not found in json object");

        let no_clk = CommandMessage {
            clk: None,
            ..CommandMessage::load("x", "1")
        };
        let err = dispatcher.handle(&no_clk, a()).await.unwrap_err();
        assert_eq!(err.to_string(), "clk not found in json object");

        assert!(executor.calls().is_empty());
    }

    #[tokio::test]
    async fn test_unknown_verb_is_usage_error() {
        let (dispatcher, _) = setup();
        let message = CommandMessage {
            cmd: "launch".into(),
            code: None,
            clk: None,
        };

        // Usage error regardless of ownership
        for owner in [None, Some(a()), Some(b())] {
            if let Some(addr) = owner {
                dispatcher.store().set(addr).await.unwrap();
            }
            let err = dispatcher.handle(&message, a()).await.unwrap_err();
            assert!(matches!(err, CommandError::Usage(_)));
        }
    }

    #[tokio::test]
    async fn test_non_string_cmd_is_usage_error() {
        let (dispatcher, executor) = setup();
        let frame = codec::percent_plus_encode(r#"{"cmd":5,"code":"x","clk":1}"#);
        let message = codec::decode(frame.as_bytes()).unwrap();

        let response = dispatcher.dispatch(&message, a()).await;
        assert!(response.is_error());
        assert!(response.message().starts_with("Incorrect command."));
        assert!(executor.calls().is_empty());
    }

    #[tokio::test]
    async fn test_process_failure_keeps_session() {
        let executor = Arc::new(FakeExecutor::failing("Error: board not detected"));
        let dispatcher =
            CommandDispatcher::new(Arc::new(SessionStore::in_memory()), executor.clone());
        dispatcher.dispatch(&cmd(Verb::Open), a()).await;

        let response = dispatcher.dispatch(&cmd(Verb::Stop), a()).await;
        assert_eq!(
            response,
            Response::Error("Error: board not detected".into())
        );
        assert_eq!(dispatcher.store().get().await, Some(a()));
    }

    #[tokio::test]
    async fn test_verbs_are_case_insensitive() {
        let (dispatcher, _) = setup();
        let message = CommandMessage {
            cmd: "OPEN".into(),
            code: None,
            clk: None,
        };
        assert!(!dispatcher.dispatch(&message, a()).await.is_error());
    }
}
