// Copyright 2025 MaidSafe.net limited.
//
// This SAFE Network Software is licensed to you under The General Public License (GPL), version 3.
// Unless required by applicable law or agreed to in writing, the SAFE Network Software distributed
// under the GPL Licence is distributed on an "AS IS" BASIS, WITHOUT WARRANTIES OR CONDITIONS OF ANY
// KIND, either express or implied. Please review the Licences for the specific language governing
// permissions and limitations relating to use of the SAFE Network Software.

//! The production endpoint: a libp2p host driven by a background task.
//!
//! The swarm lives on its own task and is steered through a command
//! channel with oneshot responders; probe tasks never touch the swarm
//! directly. Request substreams are opened out-of-band through the
//! stream behaviour's `Control` handle.

use crate::{
    addr::PeerAddr,
    protocol::{self, ProtocolError, WireMessage},
    transport::{Endpoint, IdentityInfo, RequestStream},
    Error, Result,
};
use async_trait::async_trait;
use futures::StreamExt;
use libp2p::{
    identify, noise,
    swarm::{
        dial_opts::{DialOpts, PeerCondition},
        NetworkBehaviour, SwarmEvent,
    },
    tcp, yamux, PeerId, StreamProtocol, Swarm, SwarmBuilder,
};
use std::{collections::HashMap, time::Duration};
use tokio::sync::{mpsc, oneshot, Mutex};

/// Identify protocol version string, matching what go-ipfs nodes send.
const IDENTIFY_PROTOCOL_VERSION: &str = "ipfs/0.1.0";

/// Connections are short-lived probe vehicles; drop them quickly once
/// nothing is in flight.
const IDLE_CONNECTION_TIMEOUT: Duration = Duration::from_secs(60);

const CMD_CHANNEL_SIZE: usize = 256;

#[derive(NetworkBehaviour)]
struct CrawlBehaviour {
    stream: libp2p_stream::Behaviour,
    identify: identify::Behaviour,
}

/// Commands from probe tasks to the swarm task.
enum SwarmCmd {
    Dial {
        peer: PeerAddr,
        sender: oneshot::Sender<std::result::Result<(), String>>,
    },
    GetIdentify {
        peer: PeerId,
        sender: oneshot::Sender<Option<IdentityInfo>>,
    },
    Shutdown,
}

/// Owns the swarm and serializes all access to it.
struct SwarmDriver {
    swarm: Swarm<CrawlBehaviour>,
    cmd_receiver: mpsc::Receiver<SwarmCmd>,
    pending_dials: HashMap<PeerId, Vec<oneshot::Sender<std::result::Result<(), String>>>>,
    identities: HashMap<PeerId, IdentityInfo>,
}

impl SwarmDriver {
    async fn run(mut self) {
        loop {
            tokio::select! {
                event = self.swarm.select_next_some() => self.handle_swarm_event(event),
                cmd = self.cmd_receiver.recv() => match cmd {
                    Some(SwarmCmd::Shutdown) | None => break,
                    Some(cmd) => self.handle_cmd(cmd),
                },
            }
        }
        debug!(peer = %self.swarm.local_peer_id(), "swarm driver stopped");
    }

    fn handle_cmd(&mut self, cmd: SwarmCmd) {
        match cmd {
            SwarmCmd::Dial { peer, sender } => {
                if self.swarm.is_connected(&peer.peer_id) {
                    let _ = sender.send(Ok(()));
                    return;
                }
                let opts = DialOpts::peer_id(peer.peer_id)
                    .condition(PeerCondition::Always)
                    .addresses(peer.addrs.clone())
                    .build();
                match self.swarm.dial(opts) {
                    Ok(()) => {
                        self.pending_dials
                            .entry(peer.peer_id)
                            .or_default()
                            .push(sender);
                    }
                    Err(err) => {
                        let _ = sender.send(Err(err.to_string()));
                    }
                }
            }
            SwarmCmd::GetIdentify { peer, sender } => {
                let _ = sender.send(self.identities.get(&peer).cloned());
            }
            SwarmCmd::Shutdown => {}
        }
    }

    fn handle_swarm_event(&mut self, event: SwarmEvent<CrawlBehaviourEvent>) {
        match event {
            SwarmEvent::ConnectionEstablished { peer_id, .. } => {
                for sender in self.pending_dials.remove(&peer_id).unwrap_or_default() {
                    let _ = sender.send(Ok(()));
                }
            }
            SwarmEvent::OutgoingConnectionError {
                peer_id: Some(peer_id),
                error,
                ..
            } => {
                let error = error.to_string();
                for sender in self.pending_dials.remove(&peer_id).unwrap_or_default() {
                    let _ = sender.send(Err(error.clone()));
                }
            }
            SwarmEvent::Behaviour(CrawlBehaviourEvent::Identify(identify::Event::Received {
                peer_id,
                info,
                ..
            })) => {
                self.identities.insert(
                    peer_id,
                    IdentityInfo {
                        agent_version: Some(info.agent_version),
                        protocols: info.protocols.iter().map(|p| p.to_string()).collect(),
                    },
                );
            }
            other => trace!(?other, "swarm event"),
        }
    }
}

/// A libp2p host with a fresh identity, usable as a crawl endpoint.
pub struct Libp2pEndpoint {
    local_peer_id: PeerId,
    cmd_sender: mpsc::Sender<SwarmCmd>,
    control: Mutex<libp2p_stream::Control>,
}

impl Libp2pEndpoint {
    /// Build the host and spawn its driver task. Must be called from
    /// within a tokio runtime.
    pub fn spawn(user_agent: &str) -> Result<Self> {
        let swarm = SwarmBuilder::with_new_identity()
            .with_tokio()
            .with_tcp(
                tcp::Config::default().nodelay(true),
                noise::Config::new,
                yamux::Config::default,
            )
            .map_err(|err| Error::Config(format!("tcp transport: {err}")))?
            .with_quic()
            .with_dns()
            .map_err(|err| Error::Config(format!("dns resolver: {err}")))?
            .with_behaviour(|key| CrawlBehaviour {
                stream: libp2p_stream::Behaviour::new(),
                identify: identify::Behaviour::new(
                    identify::Config::new(IDENTIFY_PROTOCOL_VERSION.to_string(), key.public())
                        .with_agent_version(user_agent.to_string()),
                ),
            })
            .map_err(|err| Error::Config(format!("behaviour: {err}")))?
            .with_swarm_config(|cfg| cfg.with_idle_connection_timeout(IDLE_CONNECTION_TIMEOUT))
            .build();

        let local_peer_id = *swarm.local_peer_id();
        let control = swarm.behaviour().stream.new_control();
        let (cmd_sender, cmd_receiver) = mpsc::channel(CMD_CHANNEL_SIZE);

        info!(peer = %local_peer_id, "starting crawl endpoint");
        tokio::spawn(
            SwarmDriver {
                swarm,
                cmd_receiver,
                pending_dials: HashMap::new(),
                identities: HashMap::new(),
            }
            .run(),
        );

        Ok(Self {
            local_peer_id,
            cmd_sender,
            control: Mutex::new(control),
        })
    }
}

#[async_trait]
impl Endpoint for Libp2pEndpoint {
    fn local_peer_id(&self) -> PeerId {
        self.local_peer_id
    }

    async fn connect(&self, peer: &PeerAddr) -> Result<()> {
        let (sender, receiver) = oneshot::channel();
        self.cmd_sender
            .send(SwarmCmd::Dial {
                peer: peer.clone(),
                sender,
            })
            .await
            .map_err(|_| Error::Channel("swarm driver gone".into()))?;
        receiver.await?.map_err(Error::ConnectFailed)
    }

    async fn open_stream(&self, peer: &PeerId, protocol: &str) -> Result<Box<dyn RequestStream>> {
        let protocol = StreamProtocol::try_from_owned(protocol.to_string())
            .map_err(|err| Error::Config(format!("invalid protocol id {protocol:?}: {err}")))?;

        let mut control = self.control.lock().await.clone();
        match control.open_stream(*peer, protocol.clone()).await {
            Ok(stream) => Ok(Box::new(KadStream {
                io: stream,
                protocol,
            })),
            Err(err) => Err(Error::StreamOpenFailed(err.to_string())),
        }
    }

    async fn identify_info(&self, peer: &PeerId) -> Option<IdentityInfo> {
        let (sender, receiver) = oneshot::channel();
        self.cmd_sender
            .send(SwarmCmd::GetIdentify {
                peer: *peer,
                sender,
            })
            .await
            .ok()?;
        receiver.await.ok().flatten()
    }

    async fn shutdown(&self) {
        let _ = self.cmd_sender.send(SwarmCmd::Shutdown).await;
    }
}

/// A negotiated Kademlia substream.
struct KadStream {
    io: libp2p::Stream,
    protocol: StreamProtocol,
}

#[async_trait]
impl RequestStream for KadStream {
    async fn find_node(&mut self, target: &[u8]) -> Result<Vec<PeerAddr>> {
        protocol::write_message(&mut self.io, &WireMessage::find_node(target)).await?;
        let response = protocol::read_message(&mut self.io).await?;
        if response.r#type != protocol::MessageType::FindNode as i32 {
            return Err(ProtocolError::UnexpectedMessageType(response.r#type).into());
        }
        Ok(response.closer_peers())
    }

    fn protocol(&self) -> &str {
        self.protocol.as_ref()
    }
}
