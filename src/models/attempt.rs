//! 生成尝试模型
//!
//! 一次会话内的多次生成尝试。失败的尝试同样占据一个编号，
//! 保证重试后展示给用户的编号保持稳定。会话结束后不持久化。

/// 单次生成尝试的结果
#[derive(Debug, Clone)]
pub enum AttemptOutcome<T> {
    Success(T),
    Failed(String),
}

/// 单次生成尝试
#[derive(Debug, Clone)]
pub struct Attempt<T> {
    /// 会话内编号，从 1 开始单调递增
    pub number: usize,
    /// 本次尝试使用的上下文
    pub context: Option<String>,
    pub outcome: AttemptOutcome<T>,
}

impl<T> Attempt<T> {
    pub fn succeeded(&self) -> bool {
        matches!(self.outcome, AttemptOutcome::Success(_))
    }

    pub fn payload(&self) -> Option<&T> {
        match &self.outcome {
            AttemptOutcome::Success(payload) => Some(payload),
            AttemptOutcome::Failed(_) => None,
        }
    }
}

/// 会话内的尝试列表，负责编号分配
#[derive(Debug)]
pub struct AttemptList<T> {
    attempts: Vec<Attempt<T>>,
}

impl<T> AttemptList<T> {
    pub fn new() -> Self {
        Self { attempts: Vec::new() }
    }

    /// 下一次尝试将获得的编号
    pub fn next_number(&self) -> usize {
        self.attempts.len() + 1
    }

    /// 追加一次成功尝试，返回分配到的编号
    pub fn push_success(&mut self, context: Option<String>, payload: T) -> usize {
        let number = self.next_number();
        self.attempts.push(Attempt {
            number,
            context,
            outcome: AttemptOutcome::Success(payload),
        });
        number
    }

    /// 追加一次失败尝试，返回分配到的编号
    pub fn push_failure(&mut self, context: Option<String>, reason: String) -> usize {
        let number = self.next_number();
        self.attempts.push(Attempt {
            number,
            context,
            outcome: AttemptOutcome::Failed(reason),
        });
        number
    }

    /// 按编号取成功尝试的负载
    pub fn get_success(&self, number: usize) -> Option<&T> {
        self.attempts
            .iter()
            .find(|a| a.number == number)
            .and_then(|a| a.payload())
    }

    /// 所有成功尝试的编号（展示与选择校验用）
    pub fn successful_numbers(&self) -> Vec<usize> {
        self.attempts
            .iter()
            .filter(|a| a.succeeded())
            .map(|a| a.number)
            .collect()
    }

    pub fn len(&self) -> usize {
        self.attempts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.attempts.is_empty()
    }
}

impl<T> Default for AttemptList<T> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_numbering_stays_stable_across_failures() {
        let mut attempts: AttemptList<String> = AttemptList::new();

        assert_eq!(attempts.next_number(), 1);
        attempts.push_failure(None, "超时".to_string());
        // 失败的尝试占据编号 1，下一次从 2 开始
        assert_eq!(attempts.next_number(), 2);
        attempts.push_success(Some("猫".to_string()), "内容".to_string());
        attempts.push_failure(None, "超时".to_string());
        attempts.push_success(None, "内容2".to_string());

        assert_eq!(attempts.len(), 4);
        assert_eq!(attempts.successful_numbers(), vec![2, 4]);
        assert!(attempts.get_success(1).is_none());
        assert_eq!(attempts.get_success(2).map(String::as_str), Some("内容"));
        assert!(attempts.get_success(3).is_none());
    }
}
