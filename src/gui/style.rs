use iced::{Background, Border, Color, Shadow, Theme};
use iced::widget::button;
use iced::widget::container;

const DEVICE_ITEM_BACKGROUND: Color = Color::from_rgb(0.93, 0.93, 0.93);
const DEVICE_ITEM_HOVERED: Color = Color::from_rgb(0.86, 0.86, 0.86);

/// One row of the discovered device list.
pub struct DeviceItemStyleSheet;

impl DeviceItemStyleSheet {
    fn appearance(background: Color) -> button::Appearance {
        button::Appearance {
            shadow_offset: Default::default(),
            background: Some(Background::Color(background)),
            text_color: Color::BLACK,
            border: Border {
                color: Color::TRANSPARENT,
                width: 0.0,
                radius: 5.0.into(),
            },
            shadow: Shadow::default(),
        }
    }
}

impl button::StyleSheet for DeviceItemStyleSheet {
    type Style = Theme;

    fn active(&self, _style: &Self::Style) -> button::Appearance {
        DeviceItemStyleSheet::appearance(DEVICE_ITEM_BACKGROUND)
    }

    fn hovered(&self, _style: &Self::Style) -> button::Appearance {
        DeviceItemStyleSheet::appearance(DEVICE_ITEM_HOVERED)
    }
}

/// The area in which the camera preview is shown.
pub struct CameraPanelStyleSheet;

impl container::StyleSheet for CameraPanelStyleSheet {
    type Style = Theme;

    fn appearance(&self, _style: &Self::Style) -> container::Appearance {
        container::Appearance {
            text_color: Some(Color::WHITE),
            background: Some(Background::Color(Color::BLACK)),
            border: Border {
                color: Color::TRANSPARENT,
                width: 0.0,
                radius: 0.0.into(),
            },
            shadow: Shadow::default(),
        }
    }
}
