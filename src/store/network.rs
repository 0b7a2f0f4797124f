//! In-memory network model implementing [`MessageStore`].
//!
//! A network is a list of buses and a list of nodes. Each node owns interfaces (each
//! optionally connected to one bus) and COM datapools; a COM datapool is bound to one
//! protocol and holds one [`MessageContainer`] per node interface.

use serde::{Deserialize, Serialize};

use crate::store::{MessageContainer, MessageStore};
use crate::types::{
    errors::StoreError,
    identifier::{ComEndpoint, MessageIdentifier, ProtocolType},
    message::CanMessage,
    signal::{CanSignal, MAX_SIGNALS_PER_MESSAGE},
};

/// CAN bus segment.
#[derive(Default, Clone, PartialEq, Debug, Serialize, Deserialize)]
pub struct Bus {
    pub name: String,
}

/// One CAN interface of a node.
#[derive(Default, Clone, PartialEq, Debug, Serialize, Deserialize)]
pub struct NodeInterface {
    pub name: String,
    /// Bus the interface is connected to (`None` = not connected).
    pub bus_index: Option<u32>,
}

/// COM datapool: message definitions of one protocol, one container per interface.
#[derive(Default, Clone, PartialEq, Debug, Serialize, Deserialize)]
pub struct ComDatapool {
    pub name: String,
    pub protocol: ProtocolType,
    pub containers: Vec<MessageContainer>,
}

/// Node/ECU of the network.
#[derive(Default, Clone, PartialEq, Debug, Serialize, Deserialize)]
pub struct Node {
    pub name: String,
    pub interfaces: Vec<NodeInterface>,
    pub datapools: Vec<ComDatapool>,
}

/// In-memory representation of a CAN network and its per-node message definitions.
#[derive(Default, Clone, PartialEq, Debug, Serialize, Deserialize)]
pub struct NetworkStore {
    pub buses: Vec<Bus>,
    pub nodes: Vec<Node>,
}

impl NetworkStore {
    // ---- Topology ----

    /// Adds a bus and returns its index.
    pub fn add_bus(&mut self, name: &str) -> u32 {
        self.buses.push(Bus {
            name: name.to_string(),
        });
        (self.buses.len() - 1) as u32
    }

    /// Adds a node with `interface_count` unconnected interfaces and returns its index.
    pub fn add_node(&mut self, name: &str, interface_count: u32) -> u32 {
        let interfaces: Vec<NodeInterface> = (0..interface_count)
            .map(|i| NodeInterface {
                name: format!("CAN{}", i + 1),
                bus_index: None,
            })
            .collect();
        self.nodes.push(Node {
            name: name.to_string(),
            interfaces,
            datapools: Vec::new(),
        });
        (self.nodes.len() - 1) as u32
    }

    /// Connects (or with `None` disconnects) a node interface.
    pub fn connect(
        &mut self,
        node_index: u32,
        interface_index: u32,
        bus_index: Option<u32>,
    ) -> Result<(), StoreError> {
        let interface: &mut NodeInterface = self
            .node_mut(node_index)?
            .interfaces
            .get_mut(interface_index as usize)
            .ok_or(StoreError::InterfaceMissing {
                node_index,
                interface_index,
            })?;
        interface.bus_index = bus_index;
        Ok(())
    }

    /// Adds a COM datapool of `protocol` to a node and returns its index.
    ///
    /// The protocol is enabled on every interface of the node.
    pub fn add_com_datapool(
        &mut self,
        node_index: u32,
        name: &str,
        protocol: ProtocolType,
    ) -> Result<u32, StoreError> {
        let node: &mut Node = self.node_mut(node_index)?;
        let containers: Vec<MessageContainer> = node
            .interfaces
            .iter()
            .map(|_| MessageContainer {
                is_protocol_used_by_interface: true,
                ..Default::default()
            })
            .collect();
        node.datapools.push(ComDatapool {
            name: name.to_string(),
            protocol,
            containers,
        });
        Ok((node.datapools.len() - 1) as u32)
    }

    /// Enables or disables the datapool's protocol on one interface.
    pub fn set_protocol_used(
        &mut self,
        node_index: u32,
        datapool_index: u32,
        interface_index: u32,
        used: bool,
    ) -> Result<(), StoreError> {
        let protocol: ProtocolType = self
            .node(node_index)?
            .datapools
            .get(datapool_index as usize)
            .map(|dp| dp.protocol)
            .ok_or(StoreError::DatapoolMissing {
                node_index,
                datapool_index,
                protocol: ProtocolType::default(),
            })?;
        let container: &mut MessageContainer =
            self.container_mut(node_index, protocol, interface_index, datapool_index)?;
        container.is_protocol_used_by_interface = used;
        Ok(())
    }

    /// Appends a message straight into a container, bypassing any sync bookkeeping.
    ///
    /// Meant for building a network before a sync manager is initialized on it.
    pub fn append_message(
        &mut self,
        endpoint: ComEndpoint,
        protocol: ProtocolType,
        is_tx: bool,
        message: CanMessage,
    ) -> Result<MessageIdentifier, StoreError> {
        let list: &mut Vec<CanMessage> = self
            .container_mut(
                endpoint.node_index,
                protocol,
                endpoint.interface_index,
                endpoint.datapool_index,
            )?
            .messages_mut(is_tx);
        list.push(message);
        Ok(MessageIdentifier::at(
            endpoint,
            protocol,
            is_tx,
            (list.len() - 1) as u32,
        ))
    }

    // ---- Lookups ----

    fn node(&self, node_index: u32) -> Result<&Node, StoreError> {
        self.nodes
            .get(node_index as usize)
            .ok_or(StoreError::NodeMissing { node_index })
    }

    fn node_mut(&mut self, node_index: u32) -> Result<&mut Node, StoreError> {
        self.nodes
            .get_mut(node_index as usize)
            .ok_or(StoreError::NodeMissing { node_index })
    }

    fn container(
        &self,
        node_index: u32,
        protocol: ProtocolType,
        interface_index: u32,
        datapool_index: u32,
    ) -> Result<&MessageContainer, StoreError> {
        let node: &Node = self.node(node_index)?;
        let datapool: &ComDatapool = node
            .datapools
            .get(datapool_index as usize)
            .filter(|dp| dp.protocol == protocol)
            .ok_or(StoreError::DatapoolMissing {
                node_index,
                datapool_index,
                protocol,
            })?;
        datapool
            .containers
            .get(interface_index as usize)
            .ok_or(StoreError::InterfaceMissing {
                node_index,
                interface_index,
            })
    }

    fn container_mut(
        &mut self,
        node_index: u32,
        protocol: ProtocolType,
        interface_index: u32,
        datapool_index: u32,
    ) -> Result<&mut MessageContainer, StoreError> {
        let node: &mut Node = self.node_mut(node_index)?;
        let datapool: &mut ComDatapool = node
            .datapools
            .get_mut(datapool_index as usize)
            .filter(|dp| dp.protocol == protocol)
            .ok_or(StoreError::DatapoolMissing {
                node_index,
                datapool_index,
                protocol,
            })?;
        datapool
            .containers
            .get_mut(interface_index as usize)
            .ok_or(StoreError::InterfaceMissing {
                node_index,
                interface_index,
            })
    }

    fn list_mut(&mut self, id: &MessageIdentifier) -> Result<&mut Vec<CanMessage>, StoreError> {
        Ok(self
            .container_mut(
                id.node_index,
                id.protocol,
                id.interface_index,
                id.datapool_index,
            )?
            .messages_mut(id.is_tx))
    }

    fn message_mut(&mut self, id: &MessageIdentifier) -> Result<&mut CanMessage, StoreError> {
        self.list_mut(id)?
            .get_mut(id.message_index as usize)
            .ok_or(StoreError::MessageIndexOutOfRange { id: *id })
    }
}

impl MessageStore for NetworkStore {
    fn message(&self, id: &MessageIdentifier) -> Option<&CanMessage> {
        self.container(
            id.node_index,
            id.protocol,
            id.interface_index,
            id.datapool_index,
        )
        .ok()?
        .messages(id.is_tx)
        .get(id.message_index as usize)
    }

    fn message_container(
        &self,
        node_index: u32,
        protocol: ProtocolType,
        interface_index: u32,
        datapool_index: u32,
    ) -> Option<&MessageContainer> {
        self.container(node_index, protocol, interface_index, datapool_index)
            .ok()
    }

    fn set_message_properties(
        &mut self,
        id: &MessageIdentifier,
        message: &CanMessage,
    ) -> Result<(), StoreError> {
        *self.message_mut(id)? = message.clone();
        Ok(())
    }

    fn insert_message(
        &mut self,
        id: &MessageIdentifier,
        message: CanMessage,
    ) -> Result<(), StoreError> {
        let list: &mut Vec<CanMessage> = self.list_mut(id)?;
        let index: usize = id.message_index as usize;
        if index > list.len() {
            return Err(StoreError::MessageIndexOutOfRange { id: *id });
        }
        list.insert(index, message);
        Ok(())
    }

    fn delete_message(&mut self, id: &MessageIdentifier) -> Result<CanMessage, StoreError> {
        let list: &mut Vec<CanMessage> = self.list_mut(id)?;
        let index: usize = id.message_index as usize;
        if index >= list.len() {
            return Err(StoreError::MessageIndexOutOfRange { id: *id });
        }
        Ok(list.remove(index))
    }

    fn insert_signal(
        &mut self,
        id: &MessageIdentifier,
        signal_index: u32,
        signal: CanSignal,
    ) -> Result<(), StoreError> {
        let message: &mut CanMessage = self.message_mut(id)?;
        if message.signals.len() >= MAX_SIGNALS_PER_MESSAGE {
            return Err(StoreError::SignalLimitReached {
                id: *id,
                limit: MAX_SIGNALS_PER_MESSAGE,
            });
        }
        let index: usize = signal_index as usize;
        if index > message.signals.len() {
            return Err(StoreError::SignalIndexOutOfRange {
                id: *id,
                signal_index,
            });
        }
        message.signals.insert(index, signal);
        Ok(())
    }

    fn delete_signal(
        &mut self,
        id: &MessageIdentifier,
        signal_index: u32,
    ) -> Result<(), StoreError> {
        let message: &mut CanMessage = self.message_mut(id)?;
        let index: usize = signal_index as usize;
        if index >= message.signals.len() {
            return Err(StoreError::SignalIndexOutOfRange {
                id: *id,
                signal_index,
            });
        }
        message.signals.remove(index);
        Ok(())
    }

    fn set_signal(
        &mut self,
        id: &MessageIdentifier,
        signal_index: u32,
        signal: &CanSignal,
    ) -> Result<(), StoreError> {
        let message: &mut CanMessage = self.message_mut(id)?;
        let slot: &mut CanSignal = message
            .signals
            .get_mut(signal_index as usize)
            .ok_or(StoreError::SignalIndexOutOfRange {
                id: *id,
                signal_index,
            })?;
        *slot = signal.clone();
        Ok(())
    }

    fn check_message_match(
        &self,
        a: &MessageIdentifier,
        b: &MessageIdentifier,
        check_tx_tx_conflict: bool,
    ) -> Result<bool, StoreError> {
        let msg_a: &CanMessage = self
            .message(a)
            .ok_or(StoreError::MessageIndexOutOfRange { id: *a })?;
        let msg_b: &CanMessage = self
            .message(b)
            .ok_or(StoreError::MessageIndexOutOfRange { id: *b })?;

        let same_can_id: bool =
            msg_a.can_id == msg_b.can_id && msg_a.is_extended == msg_b.is_extended;

        if a.is_tx && b.is_tx {
            // two transmitters are never the same message, at most a collision
            return Ok(check_tx_tx_conflict && a != b && same_can_id);
        }

        Ok(same_can_id && msg_a.name == msg_b.name && a.node_index != b.node_index)
    }

    fn bus_endpoints(&self, bus_index: u32, protocol: ProtocolType) -> Vec<ComEndpoint> {
        let mut endpoints: Vec<ComEndpoint> = Vec::new();
        for (node_index, node) in self.nodes.iter().enumerate() {
            for (interface_index, interface) in node.interfaces.iter().enumerate() {
                if interface.bus_index != Some(bus_index) {
                    continue;
                }
                for (datapool_index, datapool) in node.datapools.iter().enumerate() {
                    if datapool.protocol == protocol {
                        endpoints.push(ComEndpoint::new(
                            node_index as u32,
                            interface_index as u32,
                            datapool_index as u32,
                        ));
                    }
                }
            }
        }
        endpoints
    }

    fn interface_datapools(
        &self,
        node_index: u32,
        interface_index: u32,
        protocol: ProtocolType,
    ) -> Vec<u32> {
        let Some(node) = self.nodes.get(node_index as usize) else {
            return Vec::new();
        };
        if node.interfaces.get(interface_index as usize).is_none() {
            return Vec::new();
        }
        node.datapools
            .iter()
            .enumerate()
            .filter(|(_, dp)| dp.protocol == protocol)
            .map(|(i, _)| i as u32)
            .collect()
    }
}
