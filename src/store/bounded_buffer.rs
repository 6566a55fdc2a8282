use std::collections::VecDeque;

/// 缓冲区的展示顺序，决定插入端和淘汰端
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BufferOrder {
    /// 头部插入、尾部淘汰（日志：最新在前）
    NewestFirst,
    /// 尾部插入、头部淘汰（收益曲线：按时间顺序）
    OldestFirst,
}

/// 定长有序缓冲区，超出容量时淘汰最旧的一条
#[derive(Debug, Clone)]
pub struct BoundedBuffer<T> {
    items: VecDeque<T>,
    capacity: usize,
    order: BufferOrder,
}

impl<T> BoundedBuffer<T> {
    /// 容量至少为 1
    pub fn new(capacity: usize, order: BufferOrder) -> Self {
        let capacity = capacity.max(1);
        Self {
            items: VecDeque::with_capacity(capacity),
            capacity,
            order,
        }
    }

    /// 插入一条，返回被淘汰的元素（如有）
    pub fn push(&mut self, item: T) -> Option<T> {
        match self.order {
            BufferOrder::NewestFirst => {
                self.items.push_front(item);
                if self.items.len() > self.capacity {
                    self.items.pop_back()
                } else {
                    None
                }
            }
            BufferOrder::OldestFirst => {
                self.items.push_back(item);
                if self.items.len() > self.capacity {
                    self.items.pop_front()
                } else {
                    None
                }
            }
        }
    }

    pub fn clear(&mut self) {
        self.items.clear();
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn order(&self) -> BufferOrder {
        self.order
    }

    /// 按展示顺序迭代
    pub fn iter(&self) -> impl Iterator<Item = &T> {
        self.items.iter()
    }

    /// 最近一次插入的元素
    pub fn latest(&self) -> Option<&T> {
        match self.order {
            BufferOrder::NewestFirst => self.items.front(),
            BufferOrder::OldestFirst => self.items.back(),
        }
    }
}

impl<T: Clone> BoundedBuffer<T> {
    pub fn to_vec(&self) -> Vec<T> {
        self.items.iter().cloned().collect()
    }
}
