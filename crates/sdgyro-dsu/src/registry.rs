//! 数据订阅客户端登记表

use parking_lot::RwLock;
use std::net::SocketAddr;

/// 已订阅的客户端
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Client {
    pub address: SocketAddr,
    /// 客户端最近一次请求使用的 id，回写到每个数据包
    pub id: u32,
    /// 自上次请求以来累计的超时次数
    pub timeouts: u32,
}

/// 订阅结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Subscribe {
    /// 新客户端
    Added,
    /// 已有客户端，超时计数清零
    Refreshed,
}

/// 读写锁保护的客户端列表：广播时共享读取，增删时独占写入
#[derive(Debug)]
pub struct ClientRegistry {
    clients: RwLock<Vec<Client>>,
    timeout_limit: u32,
}

impl ClientRegistry {
    pub fn new(timeout_limit: u32) -> Self {
        Self {
            clients: RwLock::new(Vec::new()),
            timeout_limit,
        }
    }

    pub fn subscribe(&self, address: SocketAddr, id: u32) -> Subscribe {
        let mut clients = self.clients.write();
        match clients.iter_mut().find(|c| c.address == address) {
            Some(client) => {
                client.id = id;
                client.timeouts = 0;
                Subscribe::Refreshed
            },
            None => {
                clients.push(Client {
                    address,
                    id,
                    timeouts: 0,
                });
                Subscribe::Added
            },
        }
    }

    /// 所有客户端超时计数加一
    pub fn age_all(&self) {
        for client in self.clients.write().iter_mut() {
            client.timeouts += 1;
        }
    }

    /// 剔除超时计数超过上限的客户端，返回被剔除的地址
    ///
    /// `age` 为真时先给所有客户端计一次超时。
    pub fn sweep(&self, age: bool) -> Vec<SocketAddr> {
        let mut clients = self.clients.write();
        if age {
            for client in clients.iter_mut() {
                client.timeouts += 1;
            }
        }
        let mut evicted = Vec::new();
        clients.retain(|client| {
            let keep = client.timeouts <= self.timeout_limit;
            if !keep {
                evicted.push(client.address);
            }
            keep
        });
        evicted
    }

    /// 在读锁下遍历
    pub fn for_each(&self, mut f: impl FnMut(&Client)) {
        for client in self.clients.read().iter() {
            f(client);
        }
    }

    pub fn get(&self, address: SocketAddr) -> Option<Client> {
        self.clients.read().iter().find(|c| c.address == address).cloned()
    }

    pub fn contains(&self, address: SocketAddr) -> bool {
        self.get(address).is_some()
    }

    pub fn len(&self) -> usize {
        self.clients.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.clients.read().is_empty()
    }

    pub fn clear(&self) {
        self.clients.write().clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn addr(port: u16) -> SocketAddr {
        SocketAddr::from(([127, 0, 0, 1], port))
    }

    #[test]
    fn test_subscribe_and_refresh() {
        let registry = ClientRegistry::new(3);
        assert!(registry.is_empty());

        assert_eq!(registry.subscribe(addr(1), 10), Subscribe::Added);
        assert_eq!(registry.subscribe(addr(2), 20), Subscribe::Added);
        registry.age_all();
        assert_eq!(registry.get(addr(1)).unwrap().timeouts, 1);

        assert_eq!(registry.subscribe(addr(1), 11), Subscribe::Refreshed);
        let client = registry.get(addr(1)).unwrap();
        assert_eq!(client.id, 11);
        assert_eq!(client.timeouts, 0);
        assert_eq!(registry.len(), 2);
    }

    #[test]
    fn test_sweep_evicts_past_limit() {
        let registry = ClientRegistry::new(3);
        registry.subscribe(addr(1), 1);
        registry.subscribe(addr(2), 2);

        for _ in 0..3 {
            assert!(registry.sweep(true).is_empty());
        }
        // 计数等于上限时保留
        assert!(registry.sweep(false).is_empty());

        registry.subscribe(addr(2), 2);
        assert_eq!(registry.sweep(true), vec![addr(1)]);
        assert!(!registry.contains(addr(1)));
        assert!(registry.contains(addr(2)));
    }

    #[test]
    fn test_for_each_visits_all() {
        let registry = ClientRegistry::new(3);
        for port in 1..=4 {
            registry.subscribe(addr(port), u32::from(port) * 100);
        }
        let mut ids = Vec::new();
        registry.for_each(|c| ids.push(c.id));
        assert_eq!(ids, vec![100, 200, 300, 400]);

        registry.clear();
        assert!(registry.is_empty());
    }
}
