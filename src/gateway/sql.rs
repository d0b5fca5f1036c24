//! Named SQL against the remote order database.

/// A query plus the name it is logged and faked under
#[derive(Debug, Clone, Copy)]
pub struct Query {
    pub name: &'static str,
    pub sql: &'static str,
}

pub const ELIGIBLE_ORDERS: Query = Query {
    name: "eligible_orders",
    sql: r#"
    SELECT DISTINCT so."SOrderNum" AS SOrderNum
    FROM "PUB"."PV_SOrder" so
    JOIN "PUB"."PV_SOrderLine" sol
      ON so."CompNum" = sol."CompNum"
     AND so."PlantCode" = sol."PlantCode"
     AND so."SOrderNum" = sol."SOrderNum"
     AND sol."SOItemTypeCode" <> 'P4ART'
    JOIN "PUB"."PM_Item" it
      ON it."CompNum" = sol."CompNum"
     AND it."ItemCode" = sol."ItemCode"
    WHERE so."CompNum" = 2
      AND so."PlantCode" = '4'
      AND so."SOSourceCode" = 'LWS'
      AND so."SOrderStat" IN (0, 1, 2)
      AND it."ProdGroupCode" = 'P4-LWS'
      AND so."SOrderDate" >= ?
    ORDER BY so."SOrderNum" DESC
    "#,
};

pub const ELIGIBLE_ORDER: Query = Query {
    name: "eligible_order",
    sql: r#"
    SELECT so."SOrderNum" AS SOrderNum
    FROM "PUB"."PV_SOrder" so
    JOIN "PUB"."PV_SOrderLine" sol
      ON so."CompNum" = sol."CompNum"
     AND so."PlantCode" = sol."PlantCode"
     AND so."SOrderNum" = sol."SOrderNum"
     AND sol."SOItemTypeCode" <> 'P4ART'
    JOIN "PUB"."PM_Item" it
      ON it."CompNum" = sol."CompNum"
     AND it."ItemCode" = sol."ItemCode"
    WHERE so."CompNum" = 2
      AND so."PlantCode" = '4'
      AND so."SOSourceCode" = 'LWS'
      AND so."SOrderStat" IN (0, 1, 2)
      AND it."ProdGroupCode" = 'P4-LWS'
      AND so."SOrderNum" = ?
    "#,
};

pub const ORDER_LINES_SITE_A: Query = Query {
    name: "order_lines_site_a",
    sql: r#"
    SELECT sol."SOrderLineNum" AS SOrderLineNum,
           sol."ItemCode" AS ItemCode,
           sol."OrderedQty" AS OrderedQty,
           sol."ReqDate" AS ReqDate
    FROM "PUB"."PV_SOrderLine" sol
    WHERE sol."CompNum" = 2
      AND sol."PlantCode" = '4'
      AND sol."SOrderNum" = ?
    ORDER BY sol."SOrderLineNum"
    "#,
};

pub const ORDER_HEADER_SITE_A: Query = Query {
    name: "order_header_site_a",
    sql: r#"
    SELECT so."SOrderNum" AS SOrderNum, so."CustRef" AS CustRef
    FROM "PUB"."PV_SOrder" so
    WHERE so."CompNum" = 2
      AND so."PlantCode" = '4'
      AND so."SOrderNum" = ?
    "#,
};

pub const ITEM_STATUS: Query = Query {
    name: "item_status",
    sql: r#"
    SELECT "ItemStatusCode" AS ItemStatusCode
    FROM "PUB"."PM_Item"
    WHERE "CompNum" = 2
      AND "ItemCode" = ?
    "#,
};

pub const JOB_BY_ORDER_SITE_A: Query = Query {
    name: "job_by_order_site_a",
    sql: r#"
    SELECT "SOrderNum" AS SOrderNum, "JobCode" AS JobCode
    FROM "PUB"."PV_JobSOLink"
    WHERE "SOrderNum" = ?
      AND "CompNum" = 2
      AND "PlantCode" = '4'
      AND "SOPlantCode" = '4'
    ORDER BY "TableRecId" DESC
    "#,
};

pub const JOB_BY_ORDER_SITE_B: Query = Query {
    name: "job_by_order_site_b",
    sql: r#"
    SELECT "SOrderNum" AS SOrderNum, "JobCode" AS JobCode
    FROM "PUB"."PV_JobSOLink"
    WHERE "SOrderNum" = ?
      AND "CompNum" = 2
      AND "PlantCode" = '2'
      AND "SOPlantCode" = '2'
    ORDER BY "TableRecId" DESC
    "#,
};

/// Open film requirements not yet covered by a purchase or production reservation
pub const JOB_REQUIREMENTS: &str = r#"
SELECT
    a."RequirementId" AS RequirementId,
    a."JobCode"       AS JobCode,
    a."ItemCode"      AS ItemCode,
    a."RequiredQty"   AS RequiredQty,
    a."RequiredDate"  AS RequiredDate,
    a."ReqStatus"     AS ReqStatus,
    a."POResQty"      AS POResQty,
    a."InProdResQty"  AS InProdResQty,
    a."SOrderNum"     AS SOrderNum,
    a."SOrderLineNum" AS SOrderLineNum,
    a."DimA"          AS DimA
FROM "PUB"."PV_Req" a
WHERE a."CompNum" = 2
  AND a."PlantCode" = '4'
  AND a."JobCode" = ?
  AND a."ReqGroupCode" = 'P4-FILM'
  AND a."ReqStatus" IN (10, 11, 20, 21)
  AND COALESCE(a."POResQty", 0) < 1
  AND COALESCE(a."InProdResQty", 0) < 1
  AND a."RequiredQty" > 0
ORDER BY a."RequiredDate" ASC
"#;

/// All live film requirements of a job, reserved or not
pub const CURRENT_REQUIREMENTS: Query = Query {
    name: "current_requirements",
    sql: r#"
    SELECT
        a."RequirementId" AS RequirementId,
        a."JobCode"       AS JobCode,
        a."ItemCode"      AS ItemCode,
        a."RequiredQty"   AS RequiredQty,
        a."RequiredDate"  AS RequiredDate,
        a."SOrderLineNum" AS SOrderLineNum,
        a."DimA"          AS DimA
    FROM "PUB"."PV_Req" a
    WHERE a."CompNum" = 2
      AND a."PlantCode" = '4'
      AND a."JobCode" = ?
      AND a."ReqGroupCode" = 'P4-FILM'
      AND a."ReqStatus" IN (10, 11, 20, 21)
      AND a."RequiredQty" > 0
    ORDER BY a."RequiredDate" ASC
    "#,
};

pub const PO_BY_JOB: Query = Query {
    name: "po_by_job",
    sql: r#"
    SELECT po."POrderNum" AS POrderNum
    FROM "PUB"."PV_POrder" po
    WHERE po."CompNum" = 2
      AND po."SuppRef" = ?
    ORDER BY po."LastUpdatedDateTime" DESC
    "#,
};

pub const SO_BY_PO: Query = Query {
    name: "so_by_po",
    sql: r#"
    SELECT so."SOrderNum" AS SOrderNum
    FROM "PUB"."PV_SOrder" so
    WHERE so."CompNum" = 2
      AND so."PlantCode" = '2'
      AND so."AddtCustRef" = ?
    ORDER BY so."LastUpdatedDateTime" DESC
    "#,
};

pub const SO_STATUS_SITE_B: Query = Query {
    name: "so_status_site_b",
    sql: r#"
    SELECT so."SOrderStat" AS SOrderStat
    FROM "PUB"."PV_SOrder" so
    WHERE so."CompNum" = 2
      AND so."PlantCode" = '2'
      AND so."SOrderNum" = ?
    "#,
};

pub const SO_HEADER_SITE_B: Query = Query {
    name: "so_header_site_b",
    sql: r#"
    SELECT
        so."SOrderNum" AS SOrderNum,
        so."CustRef" AS CustRef,
        so."AddtCustRef" AS AddtCustRef,
        so."CustReqDate" AS ReqDate
    FROM "PUB"."PV_SOrder" so
    WHERE so."CompNum" = 2
      AND so."PlantCode" = '2'
      AND so."SOrderNum" = ?
    "#,
};

pub const SO_LINES_SITE_B: Query = Query {
    name: "so_lines_site_b",
    sql: r#"
    SELECT
        sol."SOrderLineNum" AS SOrderLineNum,
        sol."ItemCode"      AS ItemCode,
        sol."OrderedQty"    AS OrderedQty,
        sol."ReqDate"       AS ReqDate
    FROM "PUB"."PV_SOrderLine" sol
    WHERE sol."CompNum" = 2
      AND sol."PlantCode" = '2'
      AND sol."SOrderNum" = ?
    ORDER BY sol."SOrderLineNum"
    "#,
};

pub const SHIPPING_REQUEST_BY_SO: Query = Query {
    name: "shipping_request_by_so",
    sql: r#"
    SELECT srl."ShipReqNum" AS ShipReqNum
    FROM "PUB"."PV_ShipReqLine" srl
    WHERE srl."CompNum" = 2
      AND srl."PlantCode" = '2'
      AND srl."SOrderNum" = ?
    ORDER BY srl."ShipReqNum" DESC
    "#,
};

pub const JOB_LINE_QUANTITY_SITE_B: Query = Query {
    name: "job_line_quantity_site_b",
    sql: r#"
    SELECT jl."OrderedQty" AS OrderedQty
    FROM "PUB"."PV_JobLine" jl
    WHERE jl."CompNum" = 2
      AND jl."PlantCode" = '2'
      AND jl."JobCode" = ?
    ORDER BY jl."JobLineNum"
    "#,
};

pub const FORCE_AUTHORIZE: Query = Query {
    name: "force_authorize",
    sql: r#"
    UPDATE pub.pv_sorder
       SET sorderstat = 0
     WHERE compnum = 2
       AND plantcode = '2'
       AND sordernum = ?
    "#,
};

pub const CONFIRM_PURCHASE_ORDER: Query = Query {
    name: "confirm_purchase_order",
    sql: r#"
    UPDATE pub.pv_porder
       SET porderstat = 2
     WHERE compnum = 2
       AND pordernum = ?
    "#,
};

pub const PRICE_HEADER_EXISTS: Query = Query {
    name: "price_header_exists",
    sql: r#"
    SELECT 1 AS Present
    FROM "PUB"."PV_XLPRICE"
    WHERE "CompNum" = 2
      AND "ItemCode" = ?
      AND "PlantCode" = ?
      AND "PriceType" = ?
      AND "Direction" = ?
      AND "LinkingRef" = ?
    "#,
};

pub const INSERT_PRICE_HEADER: Query = Query {
    name: "insert_price_header",
    sql: r#"
    INSERT INTO "PUB"."PV_XLPRICE"
    ("Direction", "LinkingRef", "CreationDate", "LastUserCode", "RecordType", "RecordStatus",
     "CompNum", "ItemCode", "EffDate", "BreakUnitCode", "PriceUnitCode", "CurrCode", "PriceType", "PlantCode")
    VALUES (?, ?, ?, ?, ?, ?, 2, ?, ?, ?, ?, ?, ?, ?)
    "#,
};

pub const INSERT_PRICE_HEADER_WITH_EXPIRY: Query = Query {
    name: "insert_price_header_with_expiry",
    sql: r#"
    INSERT INTO "PUB"."PV_XLPRICE"
    ("Direction", "LinkingRef", "CreationDate", "ExpiryDate", "LastUserCode", "RecordType", "RecordStatus",
     "CompNum", "ItemCode", "EffDate", "BreakUnitCode", "PriceUnitCode", "CurrCode", "PriceType", "PlantCode")
    VALUES (?, ?, ?, ?, ?, ?, ?, 2, ?, ?, ?, ?, ?, ?, ?)
    "#,
};

pub const SET_PURCHASE_PRICE_CODE: Query = Query {
    name: "set_purchase_price_code",
    sql: r#"
    UPDATE PUB."PM_Item"
       SET "PurchasePriceCode" = "ItemCode"
     WHERE "CompNum" = 2
       AND "ItemCode" = ?
    "#,
};

pub const SET_SALES_PRICE_CODE: Query = Query {
    name: "set_sales_price_code",
    sql: r#"
    UPDATE PUB."PM_Item"
       SET "SalesPriceCode" = "ItemCode"
     WHERE "CompNum" = 2
       AND "ItemCode" = ?
    "#,
};
