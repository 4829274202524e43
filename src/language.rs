use clap::ValueEnum;
use serde::{Deserialize, Serialize};
use std::sync::{Arc, RwLock};

/// UI language. Also sent verbatim to the chat endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, ValueEnum, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    En,
    #[default]
    Zh,
}

impl Language {
    pub fn toggle(self) -> Self {
        match self {
            Language::En => Language::Zh,
            Language::Zh => Language::En,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Language::En => "en",
            Language::Zh => "zh",
        }
    }
}

impl std::fmt::Display for Language {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Language {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "en" | "english" => Ok(Language::En),
            "zh" | "chinese" | "中文" => Ok(Language::Zh),
            _ => Err(format!("Unknown language: {}", s)),
        }
    }
}

/// A static UI string in both supported languages.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MultilingualText {
    pub en: &'static str,
    pub zh: &'static str,
}

impl MultilingualText {
    pub const fn new(en: &'static str, zh: &'static str) -> Self {
        MultilingualText { en, zh }
    }

    pub fn get(&self, language: Language) -> &'static str {
        match language {
            Language::En => self.en,
            Language::Zh => self.zh,
        }
    }
}

/// Shared, mutable language selection.
///
/// Cloning hands out another handle to the same selection, so a toggle in the
/// CLI is observed by every session built from the same context.
#[derive(Debug, Clone, Default)]
pub struct LanguageContext {
    inner: Arc<RwLock<Language>>,
}

impl LanguageContext {
    pub fn new(language: Language) -> Self {
        LanguageContext {
            inner: Arc::new(RwLock::new(language)),
        }
    }

    pub fn get(&self) -> Language {
        match self.inner.read() {
            Ok(guard) => *guard,
            Err(poisoned) => *poisoned.into_inner(),
        }
    }

    pub fn set(&self, language: Language) {
        match self.inner.write() {
            Ok(mut guard) => *guard = language,
            Err(poisoned) => *poisoned.into_inner() = language,
        }
    }

    pub fn toggle(&self) -> Language {
        let next = self.get().toggle();
        self.set(next);
        next
    }

    pub fn text(&self, text: &MultilingualText) -> &'static str {
        text.get(self.get())
    }
}

/// Backend model that plays the doctor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, ValueEnum, Serialize, Deserialize)]
pub enum Doctor {
    #[value(name = "qwen2.5-max")]
    #[serde(rename = "Qwen2.5-Max")]
    QwenMax,
    #[value(name = "deepseek-v3")]
    #[serde(rename = "DeepSeek-V3")]
    DeepSeekV3,
    #[default]
    #[value(name = "deepseek-r1")]
    #[serde(rename = "DeepSeek-R1")]
    DeepSeekR1,
}

impl Doctor {
    pub const ALL: [Doctor; 3] = [Doctor::QwenMax, Doctor::DeepSeekV3, Doctor::DeepSeekR1];

    /// Identifier sent in the `doctor` field of chat requests.
    pub fn as_str(self) -> &'static str {
        match self {
            Doctor::QwenMax => "Qwen2.5-Max",
            Doctor::DeepSeekV3 => "DeepSeek-V3",
            Doctor::DeepSeekR1 => "DeepSeek-R1",
        }
    }

    pub fn label(self, language: Language) -> &'static str {
        match self {
            Doctor::QwenMax => translations::QWEN_MAX.get(language),
            Doctor::DeepSeekV3 => translations::DEEPSEEK_V3.get(language),
            Doctor::DeepSeekR1 => translations::DEEPSEEK_R1.get(language),
        }
    }
}

impl std::fmt::Display for Doctor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Doctor {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_lowercase();
        Doctor::ALL
            .into_iter()
            .find(|d| d.as_str().to_lowercase() == wanted)
            .ok_or_else(|| format!("Unknown doctor: {}", s))
    }
}

pub mod translations {
    use super::MultilingualText as T;

    pub const TOGGLE_LANGUAGE: T = T::new("中文", "English");
    pub const APP_TITLE: T = T::new("Medical Multi-Agent Systems", "医学多智能体系统");

    pub const DIRECT_INTERACTION_TITLE: T = T::new("Direct Interaction", "直接交互");
    pub const TYPE_MESSAGE: T = T::new("Type your message here...", "在此输入您的消息...");
    pub const WAITING_FOR_RESPONSE: T = T::new("Waiting for response...", "等待回应...");
    pub const CONVERSATION_HINT: T = T::new(
        "Type /summary to end the consultation, /reset to start over, /quit to leave.",
        "输入 /summary 结束问诊, /reset 重新开始, /quit 退出.",
    );

    pub const SELECT_CASE: T = T::new("Select a Case Study", "选择案例");
    pub const NO_CASES_FOUND: T = T::new(
        "No cases found matching your search criteria",
        "未找到匹配您搜索条件的案例",
    );

    pub const PROGRESS: T = T::new("Progress", "进度");
    pub const PLAY: T = T::new("Play", "播放");
    pub const PAUSE: T = T::new("Pause", "暂停");

    pub const DOCTOR: T = T::new("Doctor", "医生");
    pub const PATIENT: T = T::new("Patient", "患者");
    pub const REPORTER: T = T::new("Reporter", "检查员");

    pub const QWEN_MAX: T = T::new("Qwen2.5-Max", "通义千问 2.5-Max");
    pub const DEEPSEEK_V3: T = T::new("DeepSeek-V3", "深度求索 V3");
    pub const DEEPSEEK_R1: T = T::new("DeepSeek-R1 (reasoning)", "深度求索 R1 (深度思考)");

    pub const ERROR_TITLE: T = T::new("Error", "错误");
    pub const NETWORK_ERROR: T = T::new(
        "Network error, please check your connection and try again.",
        "网络错误, 请检查网络连接后重试.",
    );
    pub const TIMEOUT_ERROR: T = T::new(
        "The doctor did not respond in time. Please try again.",
        "医生响应超时, 请重试.",
    );
    pub const REQUEST_FAILED: T = T::new("Request failed, please try again.", "请求失败, 请重试.");
    pub const GENERIC_ERROR: T = T::new("Something went wrong.", "出现错误.");
    pub const RESET_SUCCESS: T = T::new("Dialogue memory has been reset.", "对话记忆已重置.");

    pub const LOGIN_SUCCESS: T = T::new("Welcome back!", "欢迎回来!");
    pub const LOGIN_FAILED: T = T::new(
        "Incorrect username or password, please try again.",
        "用户名或密码错误, 请重试.",
    );
    pub const REGISTER_SUCCESS: T = T::new("Account created.", "注册成功.");
    pub const REGISTER_FAILED: T = T::new("Registration failed.", "注册失败.");
    pub const CREDENTIALS_UPDATED: T = T::new(
        "Username and password updated successfully, please log in again",
        "用户名和密码更新成功，请重新登录",
    );
    pub const PROFILE_UPDATED: T = T::new(
        "Personal profile updated successfully",
        "个人信息更新成功",
    );

    pub const SESSION_HISTORY: T = T::new("Session History", "历史会话");
    pub const NO_DIALOGUE_HISTORY: T = T::new("No sessions yet", "暂无历史会话");
    pub const TODAY: T = T::new("Today", "今天");
    pub const YESTERDAY: T = T::new("Yesterday", "昨天");
    pub const DAYS_AGO: T = T::new("days ago", "天前");
    pub const MESSAGES: T = T::new("messages", "条消息");
}
