//! JSON payloads posted through the XLink write API.
//!
//! Codes that identify the trading relationship between the two sites
//! (supplier, customer, addresses, warehouse) are fixed here.

use chrono::{Days, NaiveDate};
use serde_json::{json, Value};

use super::errors::GatewayError;
use super::types::{LineQuantityUpdate, PurchaseOrderRequest, SalesOrderRequest, Site};
use crate::gates::ItemKind;

pub const COMPANY: i64 = 2;
pub const SUPPLIER_CODE: &str = "P4-00684";
pub const SUPPLIER_ADDRESS: i64 = 3086;
pub const WAREHOUSE: &str = "9200";
pub const CUSTOMER_CODE: &str = "POL01";
pub const BILL_ADDRESS: i64 = 107;
pub const SHIP_ADDRESS: i64 = 2430;
pub const ORDER_SOURCE: &str = "LWS";
pub const PRICE_UNIT: &str = "KFEET";
pub const UNIT_PRICE: f64 = 0.01;
pub const TERMS: &str = "NET 30";
const PURCHASE_LEAD_DAYS: u64 = 14;
const DEFAULT_CUSTOMER_LEAD_DAYS: u64 = 7;

/// Analysis types every newly created item must carry
const ANALYSIS_TYPES: &[&str] = &[
    ".030 Plates", ".045 Plates", ".067 Plates", "Area", "Art Vendor #", "ART/DES#", "Bag Style",
    "BottleSize", "Brand", "Broker Code", "Broker Rep", "Category", "CO-OP Discount", "Color Standard",
    "Commission", "Contract", "Contract Expire", "CSR REP", "CSR REP2", "CSR Supervisor", "CustSpec#",
    "CustSpecDate", "DieLine", "Dusting", "EG Print", "Flavor", "Freight Terms", "GP ID#", "HD Plates",
    "Header Size", "High OP White", "InkJet", "Len Files", "Lip", "Location Type", "Mandrel", "MCR File",
    "MSR date", "NBM", "NFM", "Number Across", "Number Around", "Number UP", "Order Type",
    "Over/Under Terms", "Pack", "Pack Type", "Plant", "Plate Type", "PLT Life FEET", "Pocket Length",
    "Price EFF Date", "Price QTR", "Printer", "Prod Line #", "Product Segment", "Rebate", "Resin",
    "Sales Person", "Shipping Request", "Sleeve", "Sub Customer", "Vender/Broker", "VMI", "Whse Terms",
    "Yield",
];

fn ymd(date: NaiveDate) -> String {
    date.format("%Y-%m-%d").to_string()
}

/// Date the supplier is asked to deliver by: two weeks ahead of the
/// requirement, but never today or earlier.
pub fn purchase_request_date(required: NaiveDate, today: NaiveDate) -> NaiveDate {
    let tomorrow = today + Days::new(1);
    match required.checked_sub_days(Days::new(PURCHASE_LEAD_DAYS)) {
        Some(date) if date > today => date,
        _ => tomorrow,
    }
}

pub fn purchase_order(request: &PurchaseOrderRequest, today: NaiveDate) -> Value {
    let required = request.required_date.unwrap_or(today + Days::new(1));
    let plant = Site::SiteA.plant_code();

    json!({
        "XLPOrders": {
            "XLPOrder": [{
                "CompNum": COMPANY,
                "PlantCode": plant,
                "SuppCode": SUPPLIER_CODE,
                "SuppRef": request.job_code,
                "POAddrNum": SUPPLIER_ADDRESS,
                "TermsCode": TERMS,
                "WHouseCode": WAREHOUSE,
                "POStatus": 2,
                "RequiredDate": ymd(required),
                "ReqDate": ymd(purchase_request_date(required, today)),
                "POrderNum": "",
                "XLPOrderLine": [{
                    "CompNum": COMPANY,
                    "PlantCode": plant,
                    "SuppCode": SUPPLIER_CODE,
                    "WhouseCode": WAREHOUSE,
                    "POrderLineNum": 1,
                    "ItemCode": request.item_code,
                    "DimA": request.dim_a,
                    "DimB": 0.0,
                    "DimC": 0.0,
                    "OrderedQty": request.quantity,
                    "ReqDate": ymd(required),
                    "PriceGroupNo": 1,
                    "PriceUnitCode": PRICE_UNIT,
                    "FCUnitPrice": UNIT_PRICE,
                    "UnitPrice": UNIT_PRICE,
                    "POLineStatus": 10,
                    "LastUserCode": "radius",
                    "MaxRollWeight": 0.0,
                    "NumberOfRolls": 0,
                }],
                "XLPOrderPrice": [{
                    "CompNum": COMPANY,
                    "ItemCode": request.item_code,
                    "LastUserCode": "radius",
                    "PriceDate": ymd(today),
                    "PriceGroupNo": 1,
                    "PriceUnitCode": PRICE_UNIT,
                    "FCUnitPrice": UNIT_PRICE,
                    "PriceStatus": 0,
                }],
            }]
        }
    })
}

pub fn sales_order(request: &SalesOrderRequest, today: NaiveDate) -> Value {
    let required = request
        .required_date
        .unwrap_or(today + Days::new(DEFAULT_CUSTOMER_LEAD_DAYS));
    let plant = Site::SiteB.plant_code();

    json!({
        "XLSOrders": {
            "XLSOrder": [{
                "CompNum": COMPANY,
                "PlantCode": plant,
                "CustCode": CUSTOMER_CODE,
                "CustRef": request.customer_reference,
                "AddtCustRef": request.po_number.to_string(),
                "SOrderDate": ymd(today),
                "CustReqDate": ymd(required),
                "SOSourceCode": ORDER_SOURCE,
                "CurrCode": "USD",
                "TermsCode": TERMS,
                "XLSOrderLine": [{
                    "SOrderLineNum": 1,
                    "PlantCode": plant,
                    "CompNum": COMPANY,
                    "ItemCode": request.item_code,
                    "OrderedQty": request.quantity,
                    "ReqDate": ymd(required),
                    "PriceUnitCode": PRICE_UNIT,
                    "UnitPrice": UNIT_PRICE,
                }],
            }]
        }
    })
}

/// Everything a shipping request needs from the site-B order
#[derive(Debug, Clone, PartialEq)]
pub struct ShippingRequestDraft {
    pub sales_order: i64,
    pub line_number: i64,
    pub item_code: String,
    pub quantity: f64,
    pub ship_date: NaiveDate,
    pub reference: String,
}

pub fn shipping_request(draft: &ShippingRequestDraft) -> Value {
    let plant = Site::SiteB.plant_code();
    json!({
        "XLShipReqs": {
            "XLShipReq": [{
                "CustCode": CUSTOMER_CODE,
                "CompNum": COMPANY,
                "BillAddrNum": BILL_ADDRESS,
                "ShipAddrNum": SHIP_ADDRESS,
                "CustContactCode": "",
                "DeliveryTerms": "FOB",
                "EstArrivalDate": ymd(draft.ship_date + Days::new(1)),
                "EstArrivalTime": "",
                "ExternalRef": format!("SO:{}", draft.sales_order),
                "PickStatus": 0,
                "PlantCode": plant,
                "ShipDate": ymd(draft.ship_date),
                "ShipReqNum": "",
                "ShipReqStat": 1,
                "XLShipReqLine": [{
                    "CompNum": COMPANY,
                    "ItemCode": draft.item_code,
                    "PlantCode": plant,
                    "SOPlantCode": plant,
                    "SOrderLineNum": draft.line_number,
                    "SOrderNum": draft.sales_order,
                    "ShipQty": draft.quantity,
                    "ShipReqLineNum": 1,
                    "ShipReqNum": "",
                    "ShippingRef": draft.reference,
                    "WhouseCode": "",
                }],
            }]
        }
    })
}

/// Advanced order processing request that creates the job for one order
pub fn job_creation(site: Site, order: i64) -> Value {
    json!({
        "AdvancedGroupingParameters": {
            "UserCode": "Radius",
            "GroupingMode": 2,
            "ShowLoadingMessages": false,
        },
        "OrderProcessingLoadCriteria": [{
            "CompNum": COMPANY,
            "SOPlantCode": site.plant_code(),
            "SOrderNum": order,
        }],
    })
}

/// Minimal payload changing one line quantity
pub fn line_quantity(update: &LineQuantityUpdate) -> Value {
    match update {
        LineQuantityUpdate::PurchaseOrder {
            po_number,
            line,
            item_code,
            quantity,
        } => json!({
            "XLPOrders": {
                "XLPOrder": [{
                    "CompNum": COMPANY,
                    "CurrCode": "USD",
                    "POrderNum": po_number,
                    "XLPOrderLine": [{
                        "CompNum": COMPANY,
                        "ItemCode": item_code,
                        "OrderedQty": quantity,
                        "POrderLineNum": line,
                        "POrderNum": po_number,
                        "PlantCode": Site::SiteA.plant_code(),
                    }],
                }]
            }
        }),
        LineQuantityUpdate::SalesOrder {
            sales_order,
            line,
            item_code,
            quantity,
            required_date,
        } => {
            let mut order_line = json!({
                "SOrderLineNum": line,
                "PlantCode": Site::SiteB.plant_code(),
                "CompNum": COMPANY,
                "SOrderNum": sales_order,
                "ItemCode": item_code,
                "OrderedQty": quantity,
            });
            if let (Some(date), Some(fields)) = (required_date, order_line.as_object_mut()) {
                fields.insert("ReqDate".to_string(), Value::String(ymd(*date)));
            }
            json!({
                "XLSOrders": {
                    "XLSOrder": [{
                        "CompNum": COMPANY,
                        "PlantCode": Site::SiteB.plant_code(),
                        "SOSourceCode": ORDER_SOURCE,
                        "CurrCode": "USD",
                        "SOrderStat": 0,
                        "SOrderNum": sales_order,
                        "XLSOrderLine": [order_line],
                    }]
                }
            })
        }
        LineQuantityUpdate::ShippingRequest {
            shipping_request,
            sales_order,
            item_code,
            quantity,
        } => {
            let number = shipping_request
                .trim()
                .parse::<i64>()
                .map(Value::from)
                .unwrap_or_else(|_| Value::String(shipping_request.clone()));
            let plant = Site::SiteB.plant_code();
            json!({
                "XLShipReqs": {
                    "XLShipReq": [{
                        "CompNum": COMPANY,
                        "PlantCode": plant,
                        "ShipReqNum": number,
                        "ShipReqStat": 1,
                        "XLShipReqLine": [{
                            "CompNum": COMPANY,
                            "PlantCode": plant,
                            "ShipReqNum": number,
                            "ShipReqLineNum": 1,
                            "ItemCode": item_code,
                            "SOPlantCode": plant,
                            "SOrderNum": sales_order,
                            "SOrderLineNum": 1,
                            "ShipQty": quantity,
                        }],
                    }]
                }
            })
        }
    }
}

/// Change the customer reference on a site-B order header
pub fn order_reference(sales_order: i64, reference: &str) -> Value {
    json!({
        "XLSOrders": {
            "XLSOrder": [{
                "CompNum": COMPANY,
                "PlantCode": Site::SiteB.plant_code(),
                "SOSourceCode": ORDER_SOURCE,
                "CurrCode": "USD",
                "SOrderNum": sales_order,
                "CustRef": reference,
            }]
        }
    })
}

/// GetItem filter returning one existing item to use as a template
pub fn item_template_filter(item_code: &str) -> Value {
    json!({
        "Filter": [{
            "page": 1,
            "PageSize": 1,
            "includechild": false,
            "Criteria": [
                {"column": "compnum", "op": "eq", "value1": COMPANY.to_string()},
                {"column": "itemcode", "op": "eq", "value1": item_code},
            ],
        }]
    })
}

fn analysis(item_code: &str) -> Value {
    Value::Array(
        ANALYSIS_TYPES
            .iter()
            .map(|analysis_type| {
                json!({
                    "CompNum": COMPANY,
                    "ItemCode": item_code,
                    "AnalysisType": analysis_type,
                    "AnalysisCode": "None",
                })
            })
            .collect(),
    )
}

fn user_defined_elements() -> Value {
    json!([
        {"Compnum": COMPANY, "UDGroup": "Item Attributes", "UDElement": "Market Product", "UDValue": "Other", "Linkpoint": 3},
        {"Compnum": COMPANY, "UDGroup": "Item Attributes", "UDElement": "Market Segment", "UDValue": "Other", "Linkpoint": 3},
    ])
}

fn kind_fields(kind: ItemKind, item_code: &str) -> Value {
    match kind {
        ItemKind::Substrate => json!({
            "ItemShortDesc": item_code,
            "EstimateUse": 101,
            "AutoRequisition": 1,
            "ClassId": 1,
            "RollType": 1,
            "FixedCost": 1,
            "BWCode": "1000 Sq. Feet",
            "BW": 25,
            "Caliper": "0.01",
            "Produced": "false",
            "Sold": "false",
            "Issued": "true",
            "Purchased": "true",
            "ItemGroupCode": "P4-F29",
            "ItemTypeCode": "PrintOPP",
            "ReqGroupCode": "P4-PF",
            "GTIN": "0",
            "OuterLabelCode": "",
            "MinorProductGroup": "",
            "CustCode": "",
            "CustItemRef": "",
            "CustItemRef2": "",
            "ProdGroupCode": "",
        }),
        ItemKind::FinishedGood => json!({
            "TaxCode": "E",
            "AutoRequisition": 0,
            "ProdGroupCode": "Rollstock",
            "ReqGroupCode": "FIN ROLL",
            "CustCode": CUSTOMER_CODE,
            "EstimateUse": 601,
            "FixedCost": 0,
            "Produced": "true",
            "Purchased": "false",
            "Issued": "false",
            "Sold": "true",
            "ItemGroupCode": "FG_L_TOL",
            "ItemTypeCode": "PRT ROLL",
            "OuterLabelCode": "RLPOL02",
            "MinorProductGroup": "PRTFILM",
            "ClassId": 6,
        }),
    }
}

/// Turn a GetItem template into a new item of `kind` in WAIT status
pub fn placeholder_item(template: &Value, kind: ItemKind, item_code: &str) -> Result<Value, GatewayError> {
    let mut payload = template.clone();
    let item = payload
        .pointer_mut("/XLItems/XLItem/0")
        .and_then(Value::as_object_mut)
        .ok_or_else(|| GatewayError::missing("GetItem template", "XLItems.XLItem"))?;

    let common = json!({
        "CompNum": COMPANY,
        "ItemCode": item_code,
        "ItemStatusCode": "WAIT",
        "UnitCode": "FEET",
        "AutoReserve": 0,
        "AutoActual": 0,
        "MasterEstimateCode": "",
        "SuccessorItemCode": "",
        "PreviousItemCode": "",
        "PurchasePriceCode": "",
        "SalesPriceCode": "",
        "EndUseCode": "10",
        "InvRefLabelCode": "InvASN01",
        "Weight": 0,
        "WeightPer": 0,
        "WeightUnitCode": "",
        "MRPItem": "false",
    });

    for fields in [common, kind_fields(kind, item_code)] {
        if let Value::Object(fields) = fields {
            item.extend(fields);
        }
    }
    item.insert("XLUDEElements".to_string(), user_defined_elements());
    item.insert("XLItemAnalysis".to_string(), analysis(item_code));

    Ok(payload)
}

/// Price header parameters for a newly created item
#[derive(Debug, Clone, PartialEq)]
pub struct PriceHeader {
    pub item_code: String,
    pub site: Site,
    pub price_type: i64,
    pub expiry_days: Option<u64>,
}

impl PriceHeader {
    pub fn for_item(kind: ItemKind, item_code: &str) -> Self {
        match kind {
            ItemKind::Substrate => Self {
                item_code: item_code.to_string(),
                site: Site::SiteA,
                price_type: 0,
                expiry_days: None,
            },
            ItemKind::FinishedGood => Self {
                item_code: item_code.to_string(),
                site: Site::SiteB,
                price_type: 1,
                expiry_days: Some(90),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn day(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn purchase_date_is_two_weeks_early_but_after_today() {
        let today = day(2026, 3, 1);
        assert_eq!(purchase_request_date(day(2026, 4, 1), today), day(2026, 3, 18));
        assert_eq!(purchase_request_date(day(2026, 3, 15), today), day(2026, 3, 2));
        assert_eq!(purchase_request_date(day(2026, 3, 10), today), day(2026, 3, 2));
    }

    #[test]
    fn purchase_order_is_keyed_by_job() {
        let request = PurchaseOrderRequest {
            job_code: "P4J-1001".to_string(),
            item_code: "16P4-2300-ABC".to_string(),
            quantity: 1250.0,
            dim_a: 24.5,
            required_date: Some(day(2026, 4, 1)),
        };
        let payload = purchase_order(&request, day(2026, 3, 1));
        let order = &payload["XLPOrders"]["XLPOrder"][0];
        assert_eq!(order["SuppRef"], "P4J-1001");
        assert_eq!(order["PlantCode"], "4");
        assert_eq!(order["ReqDate"], "2026-03-18");
        assert_eq!(order["XLPOrderLine"][0]["OrderedQty"], 1250.0);
        assert_eq!(order["XLPOrderLine"][0]["DimA"], 24.5);
        assert_eq!(order["XLPOrderPrice"][0]["PriceDate"], "2026-03-01");
    }

    #[test]
    fn sales_order_carries_po_and_reference() {
        let request = SalesOrderRequest {
            po_number: 5001,
            item_code: "1600-2300-ABC".to_string(),
            quantity: 1250.0,
            required_date: None,
            customer_reference: "PO-778".to_string(),
        };
        let payload = sales_order(&request, day(2026, 3, 1));
        let order = &payload["XLSOrders"]["XLSOrder"][0];
        assert_eq!(order["AddtCustRef"], "5001");
        assert_eq!(order["CustRef"], "PO-778");
        assert_eq!(order["CustReqDate"], "2026-03-08");
        assert_eq!(order["XLSOrderLine"][0]["ItemCode"], "1600-2300-ABC");
    }

    #[test]
    fn shipping_request_arrives_next_day() {
        let draft = ShippingRequestDraft {
            sales_order: 7001,
            line_number: 1,
            item_code: "1600-2300-ABC".to_string(),
            quantity: 1250.0,
            ship_date: day(2026, 3, 31),
            reference: "PO-778".to_string(),
        };
        let payload = shipping_request(&draft);
        let request = &payload["XLShipReqs"]["XLShipReq"][0];
        assert_eq!(request["EstArrivalDate"], "2026-04-01");
        assert_eq!(request["ExternalRef"], "SO:7001");
        assert_eq!(request["XLShipReqLine"][0]["ShippingRef"], "PO-778");
    }

    #[test]
    fn shipping_request_update_sends_numeric_number_when_possible() {
        let update = LineQuantityUpdate::ShippingRequest {
            shipping_request: "88123".to_string(),
            sales_order: 7001,
            item_code: "1600-2300-ABC".to_string(),
            quantity: 900.0,
        };
        let payload = line_quantity(&update);
        assert_eq!(payload["XLShipReqs"]["XLShipReq"][0]["ShipReqNum"], 88123);
    }

    #[test]
    fn placeholder_item_overrides_template() {
        let template = json!({
            "XLItems": {"XLItem": [{
                "ItemCode": "2300-ABC",
                "ItemStatusCode": "APP",
                "Density": 0.92,
                "XLItemAnalysis": [{"AnalysisType": "Old"}],
            }]}
        });
        let item = placeholder_item(&template, ItemKind::FinishedGood, "1600-2300-ABC").unwrap();
        let fields = &item["XLItems"]["XLItem"][0];
        assert_eq!(fields["ItemCode"], "1600-2300-ABC");
        assert_eq!(fields["ItemStatusCode"], "WAIT");
        assert_eq!(fields["Sold"], "true");
        assert_eq!(fields["Density"], 0.92);
        assert_eq!(fields["XLItemAnalysis"].as_array().unwrap().len(), ANALYSIS_TYPES.len());

        assert!(placeholder_item(&json!({}), ItemKind::Substrate, "16P4-X").is_err());
    }
}
