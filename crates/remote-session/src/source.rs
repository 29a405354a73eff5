use calloop::{
    channel::{self, Channel, Sender},
    EventSource, Poll, PostAction, Readiness, Token, TokenFactory,
};

use crate::Completion;

/// The sending half of a completion channel.
pub type CompletionSender = Sender<Completion>;

/// Create a channel through which a broker delivers [`Completion`]s to the event loop.
pub fn completion_channel() -> (CompletionSender, CompletionSource) {
    let (sender, channel) = channel::channel();
    (sender, CompletionSource { channel })
}

/// A calloop event source yielding broker completions.
///
/// The source removes itself from the event loop once every [`CompletionSender`] was dropped.
#[derive(Debug)]
#[must_use]
pub struct CompletionSource {
    channel: Channel<Completion>,
}

impl EventSource for CompletionSource {
    type Event = Completion;
    type Metadata = ();
    type Ret = ();
    type Error = Box<(dyn std::error::Error + Send + Sync + 'static)>;

    fn process_events<F>(
        &mut self,
        readiness: Readiness,
        token: Token,
        mut callback: F,
    ) -> Result<PostAction, Self::Error>
    where
        F: FnMut(Self::Event, &mut Self::Metadata) -> Self::Ret,
    {
        let mut closed = false;

        self.channel.process_events(readiness, token, |event, _| match event {
            channel::Event::Msg(completion) => {
                callback(completion, &mut ());
            }

            channel::Event::Closed => {
                closed = true;
            }
        })?;

        // Nothing can complete once the broker is gone.
        if closed {
            tracing::debug!("Broker completion channel closed");
            return Ok(PostAction::Remove);
        }

        Ok(PostAction::Continue)
    }

    fn register(&mut self, poll: &mut Poll, token_factory: &mut TokenFactory) -> calloop::Result<()> {
        self.channel.register(poll, token_factory)
    }

    fn reregister(&mut self, poll: &mut Poll, token_factory: &mut TokenFactory) -> calloop::Result<()> {
        self.channel.reregister(poll, token_factory)
    }

    fn unregister(&mut self, poll: &mut Poll) -> calloop::Result<()> {
        self.channel.unregister(poll)
    }
}

#[cfg(test)]
mod tests {
    use std::{num::NonZeroU64, time::Duration};

    use calloop::EventLoop;

    use crate::{BrokerError, Completion, OpId, Outcome};

    use super::completion_channel;

    #[test]
    fn delivers_completions_in_order() {
        let mut event_loop = EventLoop::<Vec<Completion>>::try_new().unwrap();
        let (sender, source) = completion_channel();

        event_loop
            .handle()
            .insert_source(source, |completion, _, received| {
                received.push(completion);
            })
            .unwrap();

        let first = OpId(NonZeroU64::new(1).unwrap());
        let second = OpId(NonZeroU64::new(2).unwrap());
        sender
            .send(Completion {
                op: first,
                result: Ok(Outcome::Created),
            })
            .unwrap();
        sender
            .send(Completion {
                op: second,
                result: Err(BrokerError::Denied),
            })
            .unwrap();

        let mut received = Vec::new();
        event_loop
            .dispatch(Some(Duration::from_millis(100)), &mut received)
            .unwrap();

        assert_eq!(received.len(), 2);
        assert_eq!(received[0].op, first);
        assert!(matches!(received[1].result, Err(BrokerError::Denied)));
    }
}
