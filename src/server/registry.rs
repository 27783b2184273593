// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright © 2024 RemasteredArch
//
// This file is part of smtp_embed.
//
// smtp_embed is free software: you can redistribute it and/or modify it under the terms of the
// GNU Affero General Public License as published by the Free Software Foundation, either version
// 3 of the License, or (at your option) any later version.
//
// smtp_embed is distributed in the hope that it will be useful, but WITHOUT ANY WARRANTY;
// without even the implied warranty of MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See
// the GNU Affero General Public License for more details.
//
// You should have received a copy of the GNU Affero General Public License along with
// smtp_embed. If not, see <https://www.gnu.org/licenses/>.

use std::{
    collections::HashMap,
    net::SocketAddr,
    sync::{Arc, PoisonError, RwLock},
};

use crate::{
    connection::{ClientConnection, ConnectionHandle},
    watchdog::ConnectionProvider,
};

/// The live connections of a server, keyed by the client's address.
#[derive(Debug, Default)]
pub struct Registry {
    connections: RwLock<HashMap<SocketAddr, Arc<ConnectionHandle>>>,
}

impl Registry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add `handle`, returning the handle it replaced, if any.
    pub fn insert(&self, handle: Arc<ConnectionHandle>) -> Option<Arc<ConnectionHandle>> {
        self.connections
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(handle.remote_endpoint(), handle)
    }

    /// Remove `handle`, unless another handle has since taken its address.
    ///
    /// Returns whether `handle` was removed.
    pub fn remove(&self, handle: &Arc<ConnectionHandle>) -> bool {
        let mut connections = self
            .connections
            .write()
            .unwrap_or_else(PoisonError::into_inner);

        let remote = handle.remote_endpoint();
        if connections
            .get(&remote)
            .is_some_and(|registered| Arc::ptr_eq(registered, handle))
        {
            connections.remove(&remote);
            return true;
        }

        false
    }

    #[must_use]
    pub fn get(&self, remote: &SocketAddr) -> Option<Arc<ConnectionHandle>> {
        self.connections
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(remote)
            .cloned()
    }

    /// Get a copy of every live connection.
    #[must_use]
    pub fn snapshot(&self) -> Vec<Arc<ConnectionHandle>> {
        self.connections
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .cloned()
            .collect()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.connections
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl ConnectionProvider for Registry {
    fn connections(&self) -> Vec<Arc<dyn ClientConnection>> {
        self.snapshot()
            .into_iter()
            .map(|handle| handle as Arc<dyn ClientConnection>)
            .collect()
    }
}
