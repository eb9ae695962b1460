//! 回声抑制存储
//!
//! 串行→总线方向每向 CAN 网络注入一帧，就把载荷记录在这里；
//! 总线→串行方向收到报文时先查询本存储，命中说明是我们自己
//! 刚发出的回声，必须丢弃，否则同一帧会被送回串口形成回环。
//!
//! 匹配只比较载荷字节（长度 + 内容），**不比较 CAN 标识符**——
//! 这是线协议层面的已知局限：两个不同标识符携带相同载荷时，
//! 其中一个会被错误抑制。此行为按协议文档保留，不做猜测性修复。

use std::collections::VecDeque;
use std::sync::Mutex;
use thiserror::Error;

/// 默认容量（帧）
pub const DEFAULT_ECHO_CAPACITY: usize = 128;

/// 存储层错误
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreError {
    /// 存储已达容量上限，插入被拒绝；调用方决定淘汰策略
    #[error("Echo store full (capacity {capacity})")]
    Full { capacity: usize },
}

/// 一条回声记录：一份载荷拷贝（最多 8 字节）
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct EchoRecord {
    data: [u8; 8],
    len: u8,
}

impl EchoRecord {
    fn new(payload: &[u8]) -> Self {
        let mut data = [0u8; 8];
        let len = payload.len().min(8);
        data[..len].copy_from_slice(&payload[..len]);
        Self {
            data,
            len: len as u8,
        }
    }

    fn matches(&self, payload: &[u8]) -> bool {
        self.len as usize == payload.len() && &self.data[..self.len as usize] == payload
    }
}

/// 有界 FIFO 回声抑制存储
///
/// 所有操作在单个互斥锁下整体执行，临界区为 O(容量)，
/// 且不包含任何 IO。记录不带时间戳，新旧程度由 FIFO 位置隐含。
///
/// # 示例
///
/// ```
/// use canusb_bridge::echo::EchoStore;
///
/// let store = EchoStore::new(128);
/// store.record(&[0x01, 0x02]).unwrap();
/// assert!(store.try_consume(&[0x01, 0x02]));  // 我们自己的回声
/// assert!(!store.try_consume(&[0x01, 0x02])); // 已移除，再查为假
/// ```
#[derive(Debug)]
pub struct EchoStore {
    inner: Mutex<VecDeque<EchoRecord>>,
    capacity: usize,
}

impl EchoStore {
    /// 创建存储
    ///
    /// # Panics
    /// `capacity` 为 0 时 panic（容量为零的存储无法实现淘汰策略）。
    pub fn new(capacity: usize) -> Self {
        assert!(capacity > 0, "echo store capacity must be non-zero");
        Self {
            inner: Mutex::new(VecDeque::with_capacity(capacity)),
            capacity,
        }
    }

    /// 把载荷追加到 FIFO 尾部
    ///
    /// # 错误
    /// - `StoreError::Full`: 已达容量上限，本次插入被拒绝，
    ///   已有记录不受影响；调用方可 [`evict_oldest`](Self::evict_oldest)
    ///   后重试
    pub fn record(&self, payload: &[u8]) -> Result<(), StoreError> {
        let mut inner = self.lock();
        if inner.len() >= self.capacity {
            return Err(StoreError::Full {
                capacity: self.capacity,
            });
        }
        inner.push_back(EchoRecord::new(payload));
        Ok(())
    }

    /// 从队首开始查找第一条与 `payload` 完全相等（长度 + 内容）的
    /// 记录；命中则移除并返回 true（这是我们自己的回声），
    /// 否则返回 false（真正的外部流量，应当转发）。
    pub fn try_consume(&self, payload: &[u8]) -> bool {
        let mut inner = self.lock();
        if let Some(pos) = inner.iter().position(|rec| rec.matches(payload)) {
            inner.remove(pos);
            return true;
        }
        false
    }

    /// 淘汰最旧的一条记录（容量满时的调用方策略支撑）
    pub fn evict_oldest(&self) -> bool {
        self.lock().pop_front().is_some()
    }

    /// 当前记录条数
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// 容量上限
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, VecDeque<EchoRecord>> {
        // 锁中毒只可能来自持锁线程 panic；存储操作不会 panic，
        // 即便发生也恢复内层数据继续使用
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl Default for EchoStore {
    fn default() -> Self {
        Self::new(DEFAULT_ECHO_CAPACITY)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_then_consume() {
        let store = EchoStore::new(8);
        store.record(&[0x01, 0x02]).unwrap();
        assert_eq!(store.len(), 1);
        assert!(store.try_consume(&[0x01, 0x02]));
        assert!(store.is_empty());
    }

    #[test]
    fn test_consume_removes_first_match_only() {
        // record(p1), record(p2), record(p1) → try_consume(p1) 只移除第一条
        let store = EchoStore::new(8);
        store.record(&[0xAA]).unwrap();
        store.record(&[0xBB]).unwrap();
        store.record(&[0xAA]).unwrap();

        assert!(store.try_consume(&[0xAA]));
        assert_eq!(store.len(), 2);
        assert!(store.try_consume(&[0xAA]));
        assert_eq!(store.len(), 1);
        // 没有剩余的相等记录，再查为假
        assert!(!store.try_consume(&[0xAA]));
        assert!(store.try_consume(&[0xBB]));
    }

    #[test]
    fn test_consume_miss_returns_false() {
        let store = EchoStore::new(8);
        store.record(&[0x01, 0x02]).unwrap();
        assert!(!store.try_consume(&[0x03, 0x04]));
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_length_must_match_exactly() {
        // 前缀相同但长度不同的载荷不算命中
        let store = EchoStore::new(8);
        store.record(&[0x01, 0x02, 0x03]).unwrap();
        assert!(!store.try_consume(&[0x01, 0x02]));
        assert!(!store.try_consume(&[0x01, 0x02, 0x03, 0x04]));
        assert!(store.try_consume(&[0x01, 0x02, 0x03]));
    }

    #[test]
    fn test_empty_payload_matches_empty() {
        let store = EchoStore::new(8);
        store.record(&[]).unwrap();
        assert!(!store.try_consume(&[0x00]));
        assert!(store.try_consume(&[]));
    }

    #[test]
    fn test_capacity_bound() {
        let store = EchoStore::new(2);
        store.record(&[0x01]).unwrap();
        store.record(&[0x02]).unwrap();
        assert_eq!(
            store.record(&[0x03]),
            Err(StoreError::Full { capacity: 2 })
        );
        // 拒绝插入不破坏已有记录
        assert_eq!(store.len(), 2);
        assert!(store.try_consume(&[0x01]));
        assert!(store.try_consume(&[0x02]));
        assert!(!store.try_consume(&[0x03]));
    }

    #[test]
    fn test_evict_oldest_frees_capacity() {
        let store = EchoStore::new(2);
        store.record(&[0x01]).unwrap();
        store.record(&[0x02]).unwrap();

        assert!(store.evict_oldest());
        store.record(&[0x03]).unwrap();

        // 0x01 是被淘汰的那条
        assert!(!store.try_consume(&[0x01]));
        assert!(store.try_consume(&[0x02]));
        assert!(store.try_consume(&[0x03]));
        assert!(!store.evict_oldest());
    }

    #[test]
    fn test_identifier_blind_matching() {
        // 协议局限的回归测试：匹配只看载荷，不区分来源标识符。
        // 两个不同 ID 的报文若载荷相同，第一条查询就会命中。
        let store = EchoStore::new(8);
        store.record(&[0xDE, 0xAD]).unwrap(); // 假设来自 ID 0x123
        assert!(store.try_consume(&[0xDE, 0xAD])); // ID 0x456 的同载荷报文也命中
    }

    #[test]
    fn test_concurrent_access() {
        use std::sync::Arc;
        use std::thread;

        let store = Arc::new(EchoStore::new(DEFAULT_ECHO_CAPACITY));
        let recorder = {
            let store = store.clone();
            thread::spawn(move || {
                for i in 0..64u8 {
                    store.record(&[i]).unwrap();
                }
            })
        };
        let consumer = {
            let store = store.clone();
            thread::spawn(move || {
                let mut consumed = 0;
                // 有界重试：记录线程结束后所有载荷必然可见
                for _ in 0..10_000 {
                    for i in 0..64u8 {
                        if store.try_consume(&[i]) {
                            consumed += 1;
                        }
                    }
                    if consumed == 64 {
                        break;
                    }
                }
                consumed
            })
        };

        recorder.join().unwrap();
        assert_eq!(consumer.join().unwrap(), 64);
        assert!(store.is_empty());
    }
}
