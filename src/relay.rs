//! Синхронизация кода, языка редактора и текста доски.
//!
//! Три независимых канала last-write-wins поверх того же хаба. Принятое
//! значение применяется, только если отличается от локального, иначе
//! редактор получил бы собственную правку обратно.

use crate::hub::HubSender;
use crate::signaling::ClientMessage;
use crate::timer::ScopedTimer;
use std::time::Duration;

pub const DEFAULT_LANGUAGE: &str = "javascript";

/// Шаблон начального кода для языка. Для неизвестного языка пустой
pub fn starter_template(language: &str) -> &'static str {
    match language {
        "javascript" => "function solution(input) {\n  // your code here\n}\n",
        "typescript" => "function solution(input: string): string {\n  // your code here\n  return input;\n}\n",
        "python" => "def solution(data):\n    # your code here\n    pass\n",
        "java" => "public class Solution {\n    public static void main(String[] args) {\n        // your code here\n    }\n}\n",
        "cpp" => "#include <iostream>\n\nint main() {\n    // your code here\n    return 0;\n}\n",
        "csharp" => "using System;\n\npublic class Solution\n{\n    public static void Main()\n    {\n        // your code here\n    }\n}\n",
        "go" => "package main\n\nfunc main() {\n\t// your code here\n}\n",
        _ => "",
    }
}

pub struct RoomRelay {
    room_id: String,
    hub: HubSender,
    code: String,
    language: String,
    whiteboard: String,
    whiteboard_timer: ScopedTimer,
}

impl RoomRelay {
    pub fn new(room_id: impl Into<String>, hub: HubSender, whiteboard_debounce: Duration) -> Self {
        Self {
            room_id: room_id.into(),
            hub,
            code: starter_template(DEFAULT_LANGUAGE).to_string(),
            language: DEFAULT_LANGUAGE.to_string(),
            whiteboard: String::new(),
            whiteboard_timer: ScopedTimer::new(whiteboard_debounce),
        }
    }

    pub fn code(&self) -> &str {
        &self.code
    }

    pub fn language(&self) -> &str {
        &self.language
    }

    pub fn whiteboard(&self) -> &str {
        &self.whiteboard
    }

    /// Локальная правка кода уходит сразу
    pub fn edit_code(&mut self, code: String) -> bool {
        if code == self.code {
            return false;
        }
        self.code = code.clone();
        self.hub.send(ClientMessage::SendCode {
            room_id: self.room_id.clone(),
            code,
        });
        true
    }

    /// Смена языка сбрасывает буфер кода на шаблон языка
    pub fn switch_language(&mut self, language: String) -> &str {
        let starter = starter_template(&language).to_string();
        self.language = language.clone();
        self.code = starter.clone();
        self.hub.send(ClientMessage::SendLanguage {
            room_id: self.room_id.clone(),
            language,
            starter_code: starter,
        });
        &self.code
    }

    /// Текст доски уходит после паузы в правках, отправляется только последнее значение
    pub fn edit_whiteboard(&mut self, text: String) -> bool {
        if text == self.whiteboard {
            return false;
        }
        self.whiteboard = text.clone();
        let hub = self.hub.clone();
        let msg = ClientMessage::SendWhiteboardText {
            room_id: self.room_id.clone(),
            text,
        };
        self.whiteboard_timer.arm(async move {
            hub.send(msg);
        });
        true
    }

    pub fn receive_code(&mut self, code: String) -> bool {
        if code == self.code {
            return false;
        }
        self.code = code;
        true
    }

    pub fn receive_language(&mut self, language: String, starter_code: String) -> bool {
        if language == self.language && starter_code == self.code {
            return false;
        }
        self.language = language;
        self.code = starter_code;
        true
    }

    pub fn receive_whiteboard(&mut self, text: String) -> bool {
        if text == self.whiteboard {
            return false;
        }
        // неотправленная локальная правка устарела
        if self.whiteboard_timer.cancel() {
            log::debug!("pending whiteboard update superseded by remote text");
        }
        self.whiteboard = text;
        true
    }

    /// Отменяет неотправленную правку доски
    pub fn shutdown(&mut self) {
        if self.whiteboard_timer.cancel() {
            log::debug!("pending whiteboard update discarded");
        }
    }
}
