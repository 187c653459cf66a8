//! UI Builder module for creating keyboards

use teloxide::types::{InlineKeyboardButton, InlineKeyboardMarkup};

use crate::event::{MenuOption, Selection};

/// Buttons per keyboard row
const BUTTONS_PER_ROW: usize = 2;

/// Lay out menu options as an inline keyboard.
///
/// The "back" button always gets a row of its own at the bottom.
pub fn menu_keyboard(options: &[MenuOption]) -> InlineKeyboardMarkup {
    let (back, choices): (Vec<&MenuOption>, Vec<&MenuOption>) = options
        .iter()
        .partition(|option| option.selection == Selection::MainMenu);

    let mut rows: Vec<Vec<InlineKeyboardButton>> = choices
        .chunks(BUTTONS_PER_ROW)
        .map(|row| row.iter().map(|option| button(option)).collect())
        .collect();

    for option in back {
        rows.push(vec![button(option)]);
    }

    InlineKeyboardMarkup::new(rows)
}

fn button(option: &MenuOption) -> InlineKeyboardButton {
    InlineKeyboardButton::callback(option.label.clone(), option.selection.tag())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::Platform;
    use teloxide::types::InlineKeyboardButtonKind;

    fn option(label: &str, selection: Selection) -> MenuOption {
        MenuOption {
            label: label.to_string(),
            selection,
        }
    }

    fn callback_data(button: &InlineKeyboardButton) -> &str {
        match &button.kind {
            InlineKeyboardButtonKind::CallbackData(data) => data,
            other => panic!("unexpected button kind {other:?}"),
        }
    }

    #[test]
    fn test_back_button_gets_own_row() {
        let keyboard = menu_keyboard(&[
            option("Back", Selection::MainMenu),
            option("YouTube", Selection::DownloadVideo(Platform::YouTube)),
            option("TikTok", Selection::DownloadVideo(Platform::TikTok)),
            option("Facebook", Selection::DownloadVideo(Platform::Facebook)),
        ]);

        let rows = &keyboard.inline_keyboard;
        assert_eq!(rows.len(), 3);
        assert_eq!(rows[0].len(), 2);
        assert_eq!(rows[1].len(), 1);
        assert_eq!(callback_data(&rows[0][0]), "video_youtube");
        assert_eq!(callback_data(&rows[2][0]), "back_main");
        assert_eq!(rows[2][0].text, "Back");
    }
}
