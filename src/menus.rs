//! Menu prompts shown by `/start` and the submenu buttons

use crate::event::{MenuOption, Response, Selection};
use crate::localization::t_lang;
use crate::session::Platform;

fn option(label_key: &str, selection: Selection, language_code: Option<&str>) -> MenuOption {
    MenuOption {
        label: t_lang(label_key, language_code),
        selection,
    }
}

/// Top-level menu; `welcome` selects the greeting used by `/start`
pub fn main_menu(welcome: bool, language_code: Option<&str>) -> Response {
    let text_key = if welcome { "menu-welcome" } else { "menu-main" };
    Response::MenuPrompt {
        text: t_lang(text_key, language_code),
        options: vec![
            option("button-temp-mail", Selection::TempMail, language_code),
            option("button-temp-number", Selection::TempNumber, language_code),
            option("button-video-tools", Selection::VideoTools, language_code),
            option("button-background-tools", Selection::BackgroundTools, language_code),
            option("button-resize", Selection::Resize, language_code),
        ],
    }
}

pub fn background_menu(language_code: Option<&str>) -> Response {
    Response::MenuPrompt {
        text: t_lang("menu-background", language_code),
        options: vec![
            option("button-remove-background", Selection::RemoveBackground, language_code),
            option("button-change-color", Selection::ChangeColor, language_code),
            option("button-replace-background", Selection::ReplaceBackground, language_code),
            option("button-back", Selection::MainMenu, language_code),
        ],
    }
}

pub fn video_menu(language_code: Option<&str>) -> Response {
    let mut options: Vec<MenuOption> = Platform::ALL
        .iter()
        .map(|platform| {
            option(
                &format!("button-video-{}", platform.tag()),
                Selection::DownloadVideo(*platform),
                language_code,
            )
        })
        .collect();
    options.push(option("button-back", Selection::MainMenu, language_code));

    Response::MenuPrompt {
        text: t_lang("menu-video", language_code),
        options,
    }
}
