//! 未完了カードのキーボード操作
//!
//! 上下左右はすべて同じ一次元の循環に対応する。
//! 合格は判定後に次へ進み、不合格は描述入力が続くので留まる。

/// 入力キー
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Key {
    Up,
    Down,
    Left,
    Right,
    /// 合格
    Confirm,
    /// 不合格
    Reject,
}

/// 入力に対する指示
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NavCommand {
    Ignored,
    Focus(usize),
    MarkPass { item_id: String, next_focus: usize },
    MarkFail { item_id: String },
}

#[derive(Debug, Clone, Default)]
pub struct KeyboardNav {
    cards: Vec<String>,
    focus: usize,
}

impl KeyboardNav {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn focus(&self) -> Option<usize> {
        if self.cards.is_empty() {
            None
        } else {
            Some(self.focus)
        }
    }

    pub fn focused_item(&self) -> Option<&str> {
        self.cards.get(self.focus).map(String::as_str)
    }

    pub fn cards(&self) -> &[String] {
        &self.cards
    }

    /// 再描画後のカード一覧に差し替える。フォーカス中の項目が残っていれば追従し、
    /// 消えていれば範囲内に丸める
    pub fn refresh(&mut self, cards: Vec<String>) {
        let current = self.focused_item().map(str::to_string);
        self.cards = cards;

        if let Some(idx) = current.and_then(|id| self.cards.iter().position(|c| *c == id)) {
            self.focus = idx;
        } else if self.cards.is_empty() {
            self.focus = 0;
        } else {
            self.focus = self.focus.min(self.cards.len() - 1);
        }
    }

    pub fn set_focus(&mut self, idx: usize) {
        if idx < self.cards.len() {
            self.focus = idx;
        }
    }

    pub fn handle(&mut self, key: Key, text_input_focused: bool) -> NavCommand {
        if text_input_focused || self.cards.is_empty() {
            return NavCommand::Ignored;
        }
        let len = self.cards.len();

        match key {
            Key::Left | Key::Up => {
                self.focus = (self.focus + len - 1) % len;
                NavCommand::Focus(self.focus)
            }
            Key::Right | Key::Down => {
                self.focus = (self.focus + 1) % len;
                NavCommand::Focus(self.focus)
            }
            Key::Confirm => {
                let item_id = self.cards[self.focus].clone();
                self.focus = (self.focus + 1) % len;
                NavCommand::MarkPass {
                    item_id,
                    next_focus: self.focus,
                }
            }
            Key::Reject => NavCommand::MarkFail {
                item_id: self.cards[self.focus].clone(),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn nav(n: usize) -> KeyboardNav {
        let mut nav = KeyboardNav::new();
        nav.refresh((0..n).map(|i| format!("item{}", i)).collect());
        nav
    }

    #[test]
    fn test_wraparound_both_directions() {
        let mut n = nav(3);
        assert_eq!(n.handle(Key::Left, false), NavCommand::Focus(2));
        assert_eq!(n.handle(Key::Right, false), NavCommand::Focus(0));
        assert_eq!(n.handle(Key::Up, false), NavCommand::Focus(2));
        assert_eq!(n.handle(Key::Down, false), NavCommand::Focus(0));
    }

    #[test]
    fn test_confirm_advances_reject_stays() {
        let mut n = nav(2);
        assert_eq!(
            n.handle(Key::Confirm, false),
            NavCommand::MarkPass {
                item_id: "item0".to_string(),
                next_focus: 1
            }
        );
        assert_eq!(
            n.handle(Key::Reject, false),
            NavCommand::MarkFail {
                item_id: "item1".to_string()
            }
        );
        assert_eq!(n.focus(), Some(1));
    }

    #[test]
    fn test_ignored_while_typing_or_empty() {
        let mut n = nav(2);
        assert_eq!(n.handle(Key::Right, true), NavCommand::Ignored);
        assert_eq!(n.focus(), Some(0));

        let mut empty = KeyboardNav::new();
        assert_eq!(empty.handle(Key::Confirm, false), NavCommand::Ignored);
        assert_eq!(empty.focus(), None);
    }

    #[test]
    fn test_refresh_follows_focused_item() {
        let mut n = nav(4);
        n.set_focus(2);
        n.refresh(vec!["item2".into(), "item3".into()]);
        assert_eq!(n.focused_item(), Some("item2"));
        assert_eq!(n.focus(), Some(0));
    }

    #[test]
    fn test_refresh_clamps_when_focused_item_removed() {
        let mut n = nav(4);
        n.set_focus(3);
        n.refresh(vec!["item0".into(), "item1".into()]);
        assert_eq!(n.focus(), Some(1));

        n.refresh(Vec::new());
        assert_eq!(n.focus(), None);
    }

    #[test]
    fn test_refresh_between_keys_targets_live_cards() {
        let mut n = nav(4);
        n.set_focus(1);
        assert_eq!(
            n.handle(Key::Confirm, false),
            NavCommand::MarkPass {
                item_id: "item1".into(),
                next_focus: 2
            }
        );

        // 同じフレームの次のキーの前に、完了した門店のカードが消える
        n.refresh(vec!["item2".into(), "item3".into()]);
        assert_eq!(n.handle(Key::Left, false), NavCommand::Focus(1));
        assert_eq!(n.focused_item(), Some("item3"));
    }
}
