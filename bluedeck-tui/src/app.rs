use bluedeck_core::{Device, ViewModel};
use crossterm::event::KeyCode;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FocusedPanel {
    Devices,
    Adapter,
}

pub enum Flow {
    Continue,
    Quit,
}

pub struct App {
    pub view: ViewModel,
    pub adapter_name: String,
    pub selected_device: usize,
    pub focused_panel: FocusedPanel,
}

impl App {
    pub fn new(view: ViewModel, adapter_name: &str) -> Self {
        Self {
            view,
            adapter_name: adapter_name.to_string(),
            selected_device: 0,
            focused_panel: FocusedPanel::Devices,
        }
    }

    pub async fn handle_key(&mut self, code: KeyCode) -> Flow {
        match code {
            KeyCode::Char('q') => return Flow::Quit,
            KeyCode::Up => self.previous_device(),
            KeyCode::Down => self.next_device(),
            KeyCode::Tab => self.next_panel(),
            KeyCode::Esc => self.view.dismiss_notice(),
            KeyCode::Char('s') => {
                self.view.scan_for_devices().await;
                self.selected_device = 0;
            }
            KeyCode::Char('x') => self.view.stop_scan().await,
            KeyCode::Char('b') => self.view.toggle_bluetooth().await,
            KeyCode::Char('e') => self.view.run_notice_action().await,
            KeyCode::Char('r') => self.view.refresh_power().await,
            _ => {}
        }
        self.clamp_selection();
        Flow::Continue
    }

    pub async fn tick(&mut self) {
        self.view.tick().await;
        self.clamp_selection();
    }

    pub fn previous_device(&mut self) {
        let count = self.view.devices().len();
        if count > 0 {
            self.selected_device = if self.selected_device == 0 {
                count - 1
            } else {
                self.selected_device - 1
            };
        }
    }

    pub fn next_device(&mut self) {
        let count = self.view.devices().len();
        if count > 0 {
            self.selected_device = (self.selected_device + 1) % count;
        }
    }

    pub fn next_panel(&mut self) {
        self.focused_panel = match self.focused_panel {
            FocusedPanel::Devices => FocusedPanel::Adapter,
            FocusedPanel::Adapter => FocusedPanel::Devices,
        };
    }

    pub fn selected(&self) -> Option<&Device> {
        self.view.devices().get(self.selected_device)
    }

    fn clamp_selection(&mut self) {
        let count = self.view.devices().len();
        if self.selected_device >= count {
            self.selected_device = count.saturating_sub(1);
        }
    }
}
